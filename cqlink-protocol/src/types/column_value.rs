//! Decoded cell values of a rows result.
use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use std::net::IpAddr;
use uuid::Uuid;

use crate::error::Result;
use crate::frame::message_result::{ColType, ColTypeOption};
use crate::types::data_serialization_types::*;
use crate::types::decimal::Decimal;

/// A single cell decoded according to its column type. Collections, user defined types, tuples,
/// durations and custom types are not interpreted and are exposed as their raw encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Varint(BigInt),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Inet(IpAddr),
    /// Days since the unix epoch.
    Date(i32),
    /// Nanoseconds since midnight.
    Time(i64),
    Raw(Vec<u8>),
}

impl ColumnValue {
    /// Decodes a cell. `None` stands for a null cell.
    pub fn decode(col_type: &ColTypeOption, bytes: Option<&[u8]>) -> Result<ColumnValue> {
        let bytes = match bytes {
            Some(bytes) => bytes,
            None => return Ok(ColumnValue::Null),
        };

        // an empty value is null for every type but the textual ones and blobs
        if bytes.is_empty()
            && !matches!(
                col_type.id,
                ColType::Ascii | ColType::Varchar | ColType::Blob | ColType::Custom
            )
        {
            return Ok(ColumnValue::Null);
        }

        let value = match col_type.id {
            ColType::Boolean => ColumnValue::Boolean(decode_boolean(bytes)?),
            ColType::Tinyint => ColumnValue::TinyInt(decode_tinyint(bytes)?),
            ColType::Smallint => ColumnValue::SmallInt(decode_smallint(bytes)?),
            ColType::Int => ColumnValue::Int(decode_int(bytes)?),
            ColType::Bigint | ColType::Counter => ColumnValue::BigInt(decode_bigint(bytes)?),
            ColType::Float => ColumnValue::Float(decode_float(bytes)?),
            ColType::Double => ColumnValue::Double(decode_double(bytes)?),
            ColType::Decimal => ColumnValue::Decimal(decode_decimal(bytes)?),
            ColType::Varint => ColumnValue::Varint(decode_varint(bytes)?),
            ColType::Ascii | ColType::Varchar => ColumnValue::Text(decode_text(bytes)?),
            ColType::Blob => ColumnValue::Blob(decode_blob(bytes)?),
            ColType::Timestamp => ColumnValue::Timestamp(decode_timestamp(bytes)?),
            ColType::Uuid | ColType::Timeuuid => ColumnValue::Uuid(decode_uuid(bytes)?),
            ColType::Inet => ColumnValue::Inet(decode_inet(bytes)?),
            ColType::Date => ColumnValue::Date(decode_date(bytes)?),
            ColType::Time => ColumnValue::Time(decode_time(bytes)?),
            ColType::Custom
            | ColType::Duration
            | ColType::List
            | ColType::Map
            | ColType::Set
            | ColType::Udt
            | ColType::Tuple => ColumnValue::Raw(bytes.to_vec()),
        };

        Ok(value)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }
}
