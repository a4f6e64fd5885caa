use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use std::io;
use std::net;

use super::decimal::Decimal;
use crate::types::{
    try_f32_from_bytes, try_f64_from_bytes, try_i16_from_bytes, try_i32_from_bytes,
    try_i64_from_bytes, INT_LEN,
};

// https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec#L813

const FALSE_BYTE: u8 = 0;

fn unexpected_eof(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("not enough bytes to decode {what}"),
    )
}

// Decodes `ascii`, `varchar` and `text` data
#[inline]
pub fn decode_text(bytes: &[u8]) -> Result<String, io::Error> {
    String::from_utf8(bytes.to_vec())
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
}

// Decodes `bigint` and `counter` data
#[inline]
pub fn decode_bigint(bytes: &[u8]) -> Result<i64, io::Error> {
    try_i64_from_bytes(bytes)
}

// Decodes `blob` data; passed through as-is
#[inline]
pub fn decode_blob(bytes: &[u8]) -> Result<Vec<u8>, io::Error> {
    Ok(bytes.to_vec())
}

// Decodes `boolean` data
#[inline]
pub fn decode_boolean(bytes: &[u8]) -> Result<bool, io::Error> {
    bytes
        .first()
        .map(|byte| *byte != FALSE_BYTE)
        .ok_or_else(|| unexpected_eof("boolean"))
}

// Decodes `int` data
#[inline]
pub fn decode_int(bytes: &[u8]) -> Result<i32, io::Error> {
    try_i32_from_bytes(bytes)
}

// Decodes `date` data: days since -5877641-06-23, with 2^31 being the unix epoch
#[inline]
pub fn decode_date(bytes: &[u8]) -> Result<i32, io::Error> {
    try_i32_from_bytes(bytes).map(|days| (days as u32).wrapping_sub(1 << 31) as i32)
}

// Decodes `decimal` data: scale followed by an unscaled varint
pub fn decode_decimal(bytes: &[u8]) -> Result<Decimal, io::Error> {
    if bytes.len() < INT_LEN {
        return Err(unexpected_eof("decimal"));
    }

    let (scale, unscaled) = bytes.split_at(INT_LEN);

    let scale = try_i32_from_bytes(scale)?;
    let unscaled = decode_varint(unscaled)?;

    Ok(Decimal::new(unscaled, scale))
}

// Decodes `double` data
#[inline]
pub fn decode_double(bytes: &[u8]) -> Result<f64, io::Error> {
    try_f64_from_bytes(bytes)
}

// Decodes `float` data
#[inline]
pub fn decode_float(bytes: &[u8]) -> Result<f32, io::Error> {
    try_f32_from_bytes(bytes)
}

// Decodes `inet` data
pub fn decode_inet(bytes: &[u8]) -> Result<net::IpAddr, io::Error> {
    if let Ok(array) = <[u8; 4]>::try_from(bytes) {
        return Ok(net::IpAddr::V4(net::Ipv4Addr::from(array)));
    }

    if let Ok(array) = <[u8; 16]>::try_from(bytes) {
        return Ok(net::IpAddr::V6(net::Ipv6Addr::from(array)));
    }

    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Invalid Ip address {bytes:?}"),
    ))
}

// Decodes `timestamp` data: milliseconds since the unix epoch
pub fn decode_timestamp(bytes: &[u8]) -> Result<DateTime<Utc>, io::Error> {
    let millis = try_i64_from_bytes(bytes)?;
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Timestamp out of range: {millis}"),
        )
    })
}

// Decodes `smallint` data
#[inline]
pub fn decode_smallint(bytes: &[u8]) -> Result<i16, io::Error> {
    try_i16_from_bytes(bytes)
}

// Decodes `tinyint` data
#[inline]
pub fn decode_tinyint(bytes: &[u8]) -> Result<i8, io::Error> {
    match bytes {
        [byte] => Ok(*byte as i8),
        _ => Err(unexpected_eof("tinyint")),
    }
}

// Decodes `time` data: nanoseconds since midnight
#[inline]
pub fn decode_time(bytes: &[u8]) -> Result<i64, io::Error> {
    try_i64_from_bytes(bytes)
}

// Decodes `uuid` and `timeuuid` data
#[inline]
pub fn decode_uuid(bytes: &[u8]) -> Result<uuid::Uuid, uuid::Error> {
    uuid::Uuid::from_slice(bytes)
}

// Decodes `varint` data
#[inline]
pub fn decode_varint(bytes: &[u8]) -> Result<BigInt, io::Error> {
    Ok(BigInt::from_signed_bytes_be(bytes))
}
