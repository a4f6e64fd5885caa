use bitflags::bitflags;
use std::io::Cursor;

use crate::consistency::Consistency;
use crate::frame::{FromCursor, Serialize, Version};
use crate::types::value::Value;
use crate::types::{serialize_str_long, CBytes, CInt, CIntShort, CLong, INT_LEN};

bitflags! {
    /// Flags of a QUERY request body.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueryFlags: u8 {
        const VALUE = 0x01;
        const SKIP_METADATA = 0x02;
        const PAGE_SIZE = 0x04;
        const WITH_PAGING_STATE = 0x08;
        const WITH_SERIAL_CONSISTENCY = 0x10;
        const WITH_DEFAULT_TIMESTAMP = 0x20;
    }
}

/// Parameters of a query, sent along with the statement itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryParams {
    pub consistency: Consistency,
    pub values: Option<Vec<Value>>,
    pub page_size: Option<CInt>,
    pub paging_state: Option<CBytes>,
    /// Passed through to the server unchanged.
    pub serial_consistency: Option<Consistency>,
    pub timestamp: Option<CLong>,
}

impl QueryParams {
    fn flags(&self) -> QueryFlags {
        let mut flags = QueryFlags::empty();

        if self.values.is_some() {
            flags.insert(QueryFlags::VALUE);
        }

        if self.page_size.is_some() {
            flags.insert(QueryFlags::PAGE_SIZE);
        }

        if self.paging_state.is_some() {
            flags.insert(QueryFlags::WITH_PAGING_STATE);
        }

        if self.serial_consistency.is_some() {
            flags.insert(QueryFlags::WITH_SERIAL_CONSISTENCY);
        }

        if self.timestamp.is_some() {
            flags.insert(QueryFlags::WITH_DEFAULT_TIMESTAMP);
        }

        flags
    }
}

impl Serialize for QueryParams {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.consistency.serialize(cursor, version);
        self.flags().bits().serialize(cursor, version);

        if let Some(values) = &self.values {
            let len = values.len() as CIntShort;
            len.serialize(cursor, version);

            for value in values {
                value.serialize(cursor, version);
            }
        }

        if let Some(page_size) = self.page_size {
            page_size.serialize(cursor, version);
        }

        if let Some(paging_state) = &self.paging_state {
            paging_state.serialize(cursor, version);
        }

        if let Some(serial_consistency) = self.serial_consistency {
            serial_consistency.serialize(cursor, version);
        }

        if let Some(timestamp) = self.timestamp {
            timestamp.serialize(cursor, version);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyReqQuery {
    pub query: String,
    pub query_params: QueryParams,
}

impl BodyReqQuery {
    pub fn new(query: String, query_params: QueryParams) -> BodyReqQuery {
        BodyReqQuery {
            query,
            query_params,
        }
    }

    /// Reads the consistency out of an encoded body without decoding the rest of it.
    pub fn consistency_from_body(body: &[u8]) -> Option<Consistency> {
        let mut cursor = Cursor::new(body);
        let query_len = CInt::from_cursor(&mut cursor, Version::V4).ok()?;
        cursor.set_position((INT_LEN as u64).checked_add(u64::try_from(query_len).ok()?)?);

        Consistency::from_cursor(&mut cursor, Version::V4).ok()
    }
}

impl Serialize for BodyReqQuery {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_str_long(cursor, &self.query, version);
        self.query_params.serialize(cursor, version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_minimal_query() {
        let body = BodyReqQuery::new("USE ks".into(), Default::default());
        let bytes = body.serialize_to_vec(Version::V4);

        assert_eq!(
            bytes,
            vec![0, 0, 0, 6, b'U', b'S', b'E', b' ', b'k', b's', 0, 1, 0]
        );
    }

    #[test]
    fn should_serialize_flags_in_order() {
        let body = BodyReqQuery::new(
            "Q".into(),
            QueryParams {
                consistency: Consistency::LocalQuorum,
                values: Some(vec![Value::from(7i32), Value::Null]),
                page_size: Some(100),
                paging_state: None,
                serial_consistency: Some(Consistency::LocalSerial),
                timestamp: None,
            },
        );

        let bytes = body.serialize_to_vec(Version::V4);
        let expected = vec![
            0, 0, 0, 1, b'Q', // query
            0, 6, // consistency
            0x15, // values | page size | serial consistency
            0, 2, // value count
            0, 0, 0, 4, 0, 0, 0, 7, // 7i32
            0xFF, 0xFF, 0xFF, 0xFF, // null
            0, 0, 0, 100, // page size
            0, 9, // serial consistency
        ];

        assert_eq!(bytes, expected);
        assert_eq!(
            BodyReqQuery::consistency_from_body(&bytes),
            Some(Consistency::LocalQuorum)
        );
    }
}
