use std::convert::TryInto;
use std::io::{self, Cursor, Read, Write};

use crate::error::Result as ProtocolResult;
use crate::frame::traits::FromCursor;
use crate::frame::{Serialize, Version};

pub const SHORT_LEN: usize = 2;
pub const INT_LEN: usize = 4;
pub const LONG_LEN: usize = 8;
pub const UUID_LEN: usize = 16;

const NULL_INT_LEN: CInt = -1;

pub mod column_value;
pub mod data_serialization_types;
pub mod decimal;
pub mod value;

pub type CInt = i32;
pub type CIntShort = i16;
pub type CLong = i64;

#[inline]
fn convert_to_array<const S: usize>(bytes: &[u8]) -> Result<[u8; S], io::Error> {
    bytes
        .try_into()
        .map_err(|error| io::Error::new(io::ErrorKind::UnexpectedEof, error))
}

#[inline]
pub fn try_i64_from_bytes(bytes: &[u8]) -> Result<i64, io::Error> {
    Ok(i64::from_be_bytes(convert_to_array(bytes)?))
}

#[inline]
pub fn try_i32_from_bytes(bytes: &[u8]) -> Result<i32, io::Error> {
    Ok(i32::from_be_bytes(convert_to_array(bytes)?))
}

#[inline]
pub fn try_i16_from_bytes(bytes: &[u8]) -> Result<i16, io::Error> {
    Ok(i16::from_be_bytes(convert_to_array(bytes)?))
}

#[inline]
pub fn try_f32_from_bytes(bytes: &[u8]) -> Result<f32, io::Error> {
    Ok(f32::from_be_bytes(convert_to_array(bytes)?))
}

#[inline]
pub fn try_f64_from_bytes(bytes: &[u8]) -> Result<f64, io::Error> {
    Ok(f64::from_be_bytes(convert_to_array(bytes)?))
}

pub fn serialize_str(cursor: &mut Cursor<&mut Vec<u8>>, value: &str, version: Version) {
    let len = value.len() as CIntShort;
    len.serialize(cursor, version);
    let _ = cursor.write(value.as_bytes());
}

pub fn serialize_str_long(cursor: &mut Cursor<&mut Vec<u8>>, value: &str, version: Version) {
    let len = value.len() as CInt;
    len.serialize(cursor, version);
    let _ = cursor.write(value.as_bytes());
}

pub fn from_cursor_str<'a>(cursor: &mut Cursor<&'a [u8]>) -> ProtocolResult<&'a str> {
    let mut buff = [0; SHORT_LEN];
    cursor.read_exact(&mut buff)?;

    let len = CIntShort::from_be_bytes(buff);
    let body_bytes = cursor_next_value_ref(cursor, len.max(0) as usize)?;

    std::str::from_utf8(body_bytes).map_err(Into::into)
}

pub fn from_cursor_string_list(cursor: &mut Cursor<&[u8]>) -> ProtocolResult<Vec<String>> {
    let mut buff = [0; SHORT_LEN];
    cursor.read_exact(&mut buff)?;

    let len = i16::from_be_bytes(buff);
    let mut list = Vec::with_capacity(len.max(0) as usize);
    for _ in 0..len {
        list.push(from_cursor_str(cursor)?.to_string());
    }

    Ok(list)
}

/// Returns a slice of the next `len` bytes and advances the cursor past them.
pub fn cursor_next_value_ref<'a>(cursor: &mut Cursor<&'a [u8]>, len: usize) -> ProtocolResult<&'a [u8]> {
    let start = cursor.position() as usize;
    let buffer = *cursor.get_ref();
    let end = start
        .checked_add(len)
        .filter(|end| *end <= buffer.len())
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "Value exceeds buffer"))?;

    cursor.set_position(end as u64);
    Ok(&buffer[start..end])
}

#[inline]
pub fn cursor_next_value(cursor: &mut Cursor<&[u8]>, len: usize) -> ProtocolResult<Vec<u8>> {
    cursor_next_value_ref(cursor, len).map(|value| value.to_vec())
}

/// The structure that represents the `[bytes]` protocol type; a negative length encodes null.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Ord, PartialOrd, Default)]
pub struct CBytes {
    bytes: Option<Vec<u8>>,
}

impl CBytes {
    #[inline]
    pub fn new(bytes: Vec<u8>) -> CBytes {
        CBytes { bytes: Some(bytes) }
    }

    /// Creates bytes that represent a null value.
    #[inline]
    pub fn new_null() -> CBytes {
        CBytes { bytes: None }
    }

    #[inline]
    pub fn as_slice(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.bytes.is_none()
    }

    /// Null values and zero-length values are both treated as empty, the way the server does for
    /// non-string types.
    #[inline]
    pub fn is_null_or_empty(&self) -> bool {
        match &self.bytes {
            None => true,
            Some(bytes) => bytes.is_empty(),
        }
    }

    #[inline]
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.bytes
    }
}

impl FromCursor for CBytes {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> ProtocolResult<CBytes> {
        let len = CInt::from_cursor(cursor, version)?;
        if len < 0 {
            return Ok(CBytes::new_null());
        }

        cursor_next_value(cursor, len as usize).map(CBytes::new)
    }
}

impl Serialize for CBytes {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        match &self.bytes {
            Some(bytes) => {
                let len = bytes.len() as CInt;
                len.serialize(cursor, version);
                bytes.serialize(cursor, version);
            }
            None => NULL_INT_LEN.serialize(cursor, version),
        }
    }
}

impl FromCursor for CInt {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> ProtocolResult<CInt> {
        let mut buff = [0; INT_LEN];
        cursor.read_exact(&mut buff)?;
        Ok(CInt::from_be_bytes(buff))
    }
}

impl FromCursor for CIntShort {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> ProtocolResult<CIntShort> {
        let mut buff = [0; SHORT_LEN];
        cursor.read_exact(&mut buff)?;
        Ok(CIntShort::from_be_bytes(buff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_read_null_bytes() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF];
        let mut cursor = Cursor::new(&data[..]);

        let bytes = CBytes::from_cursor(&mut cursor, Version::V4).unwrap();
        assert!(bytes.is_null());
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn should_read_bytes() {
        let data = [0, 0, 0, 3, 1, 2, 3, 9];
        let mut cursor = Cursor::new(&data[..]);

        let bytes = CBytes::from_cursor(&mut cursor, Version::V4).unwrap();
        assert_eq!(bytes.as_slice(), Some(&[1, 2, 3][..]));
        assert_eq!(cursor.position(), 7);
    }

    #[test]
    fn should_fail_on_truncated_bytes() {
        let data = [0, 0, 0, 5, 1, 2];
        let mut cursor = Cursor::new(&data[..]);

        assert!(CBytes::from_cursor(&mut cursor, Version::V4).is_err());
    }

    #[test]
    fn should_read_string_list() {
        let data = [0, 2, 0, 1, b'a', 0, 2, b'b', b'c'];
        let mut cursor = Cursor::new(&data[..]);

        assert_eq!(
            from_cursor_string_list(&mut cursor).unwrap(),
            vec!["a".to_string(), "bc".to_string()]
        );
    }
}
