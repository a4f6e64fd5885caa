use chrono::{DateTime, Utc};
use std::io::Cursor;
use uuid::Uuid;

use crate::frame::{Serialize, Version};
use crate::types::decimal::Decimal;
use crate::types::CInt;

const NULL_INT_VALUE: CInt = -1;
const NOT_SET_INT_VALUE: CInt = -2;

/// A bound query value in its serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Some(Vec<u8>),
    Null,
    NotSet,
}

impl Value {
    pub fn new<B: Into<Bytes>>(v: B) -> Value {
        Value::Some(v.into().0)
    }
}

impl Serialize for Value {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        match self {
            Value::Null => NULL_INT_VALUE.serialize(cursor, version),
            Value::NotSet => NOT_SET_INT_VALUE.serialize(cursor, version),
            Value::Some(value) => {
                let len = value.len() as CInt;
                len.serialize(cursor, version);
                value.serialize(cursor, version);
            }
        }
    }
}

impl<T: Into<Bytes>> From<T> for Value {
    fn from(b: T) -> Value {
        Value::new(b)
    }
}

impl<T: Into<Bytes>> From<Option<T>> for Value {
    fn from(b: Option<T>) -> Value {
        match b {
            Some(b) => Value::new(b),
            None => Value::Null,
        }
    }
}

/// Serialized representation of a single value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    #[inline]
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<String> for Bytes {
    #[inline]
    fn from(value: String) -> Self {
        Bytes(value.into_bytes())
    }
}

impl From<&str> for Bytes {
    #[inline]
    fn from(value: &str) -> Self {
        Bytes(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Bytes {
    #[inline]
    fn from(value: Vec<u8>) -> Self {
        Bytes(value)
    }
}

impl From<bool> for Bytes {
    #[inline]
    fn from(value: bool) -> Self {
        Bytes(vec![u8::from(value)])
    }
}

impl From<Uuid> for Bytes {
    #[inline]
    fn from(value: Uuid) -> Self {
        Bytes(value.as_bytes().to_vec())
    }
}

impl From<DateTime<Utc>> for Bytes {
    #[inline]
    fn from(value: DateTime<Utc>) -> Self {
        Bytes(value.timestamp_millis().to_be_bytes().to_vec())
    }
}

impl From<Decimal> for Bytes {
    #[inline]
    fn from(value: Decimal) -> Self {
        Bytes(value.serialize_to_vec(Version::V4))
    }
}

macro_rules! into_bytes_be {
    ($t:ty) => {
        impl From<$t> for Bytes {
            #[inline]
            fn from(value: $t) -> Self {
                Bytes(value.to_be_bytes().to_vec())
            }
        }
    };
}

into_bytes_be!(i8);
into_bytes_be!(i16);
into_bytes_be!(i32);
into_bytes_be!(i64);
into_bytes_be!(f32);
into_bytes_be!(f64);
