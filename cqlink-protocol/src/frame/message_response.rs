use std::io::Cursor;

use crate::frame::message_error::ErrorBody;
use crate::frame::message_result::{BodyResResultRows, ResResultBody, RowsMetadata};
use crate::frame::{FromCursor, Opcode, Serialize, Version};
use crate::types::{from_cursor_str, serialize_str};
use crate::{error, Error};

#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum ResponseBody {
    Error(ErrorBody),
    Ready,
    /// The server requires authentication; contains the authenticator class name.
    Authenticate(String),
    Result(ResResultBody),
    /// A response the driver does not interpret: SUPPORTED, EVENT or the SASL exchange.
    Other { opcode: Opcode, body: Vec<u8> },
}

impl Serialize for ResponseBody {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        match self {
            ResponseBody::Error(error_body) => error_body.serialize(cursor, version),
            ResponseBody::Ready => {}
            ResponseBody::Authenticate(authenticator) => {
                serialize_str(cursor, authenticator, version)
            }
            ResponseBody::Result(result) => result.serialize(cursor, version),
            ResponseBody::Other { body, .. } => body.serialize(cursor, version),
        }
    }
}

impl ResponseBody {
    pub fn try_from(
        bytes: &[u8],
        response_type: Opcode,
        version: Version,
    ) -> error::Result<ResponseBody> {
        let mut cursor: Cursor<&[u8]> = Cursor::new(bytes);
        match response_type {
            Opcode::Error => ErrorBody::from_cursor(&mut cursor, version).map(ResponseBody::Error),
            Opcode::Ready => Ok(ResponseBody::Ready),
            Opcode::Authenticate => from_cursor_str(&mut cursor)
                .map(|authenticator| ResponseBody::Authenticate(authenticator.to_string())),
            Opcode::Result => {
                ResResultBody::from_cursor(&mut cursor, version).map(ResponseBody::Result)
            }
            opcode if opcode.is_response() => Ok(ResponseBody::Other {
                opcode,
                body: bytes.to_vec(),
            }),
            _ => Err(Error::NonResponseOpcode(response_type)),
        }
    }

    /// The opcode a frame carrying this body would have.
    pub fn opcode(&self) -> Opcode {
        match self {
            ResponseBody::Error(_) => Opcode::Error,
            ResponseBody::Ready => Opcode::Ready,
            ResponseBody::Authenticate(_) => Opcode::Authenticate,
            ResponseBody::Result(_) => Opcode::Result,
            ResponseBody::Other { opcode, .. } => *opcode,
        }
    }

    pub fn into_rows(self) -> Option<BodyResResultRows> {
        match self {
            ResponseBody::Result(res) => res.into_rows(),
            _ => None,
        }
    }

    pub fn as_rows_metadata(&self) -> Option<&RowsMetadata> {
        match self {
            ResponseBody::Result(res) => res.as_rows_metadata(),
            _ => None,
        }
    }

    pub fn into_error(self) -> Option<ErrorBody> {
        match self {
            ResponseBody::Error(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::message_error::AdditionalErrorInfo;

    #[test]
    fn should_parse_ready() {
        assert_eq!(
            ResponseBody::try_from(&[], Opcode::Ready, Version::V4).unwrap(),
            ResponseBody::Ready
        );
    }

    #[test]
    fn should_parse_authenticate() {
        let body = [0, 3, b'P', b'w', b'd'];
        assert_eq!(
            ResponseBody::try_from(&body, Opcode::Authenticate, Version::V4).unwrap(),
            ResponseBody::Authenticate("Pwd".into())
        );
    }

    #[test]
    fn should_parse_error() {
        let error = ErrorBody {
            error_code: 0x1001,
            message: "overloaded".into(),
            additional_info: AdditionalErrorInfo::Overloaded,
        };
        let body = ResponseBody::Error(error.clone());
        let encoded = body.serialize_to_vec(Version::V4);

        let decoded = ResponseBody::try_from(&encoded, Opcode::Error, Version::V4).unwrap();
        assert_eq!(decoded.into_error(), Some(error));
    }

    #[test]
    fn should_reject_request_opcode() {
        assert!(ResponseBody::try_from(&[], Opcode::Query, Version::V4).is_err());
    }

    #[test]
    fn should_keep_uninterpreted_bodies() {
        let decoded = ResponseBody::try_from(&[1, 2], Opcode::Event, Version::V4).unwrap();
        assert_eq!(decoded.opcode(), Opcode::Event);
    }
}
