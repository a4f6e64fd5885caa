use std::collections::HashMap;
use std::io::Cursor;

use crate::frame::{Serialize, Version};
use crate::types::{serialize_str, CIntShort};

const CQL_VERSION: &str = "CQL_VERSION";
const CQL_VERSION_VAL: &str = "3.0.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyReqStartup {
    pub map: HashMap<String, String>,
}

impl BodyReqStartup {
    pub fn new(_version: Version) -> BodyReqStartup {
        let mut map = HashMap::new();
        map.insert(CQL_VERSION.into(), CQL_VERSION_VAL.into());

        BodyReqStartup { map }
    }
}

impl Serialize for BodyReqStartup {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        let num = self.map.len() as CIntShort;
        num.serialize(cursor, version);

        for (key, val) in &self.map {
            serialize_str(cursor, key, version);
            serialize_str(cursor, val, version);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_cql_version() {
        let body = BodyReqStartup::new(Version::V4);
        let bytes = body.serialize_to_vec(Version::V4);

        let mut expected = vec![0, 1, 0, 11];
        expected.extend_from_slice(CQL_VERSION.as_bytes());
        expected.extend_from_slice(&[0, 5]);
        expected.extend_from_slice(CQL_VERSION_VAL.as_bytes());

        assert_eq!(bytes, expected);
    }
}
