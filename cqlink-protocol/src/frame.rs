//! `frame` module contains general Frame functionality.
use bitflags::bitflags;
use derive_more::Display;
use std::convert::TryFrom;

use crate::consistency::Consistency;
use crate::error;
use crate::frame::message_query::{BodyReqQuery, QueryParams};
use crate::frame::message_response::ResponseBody;
use crate::frame::message_startup::BodyReqStartup;
pub use crate::frame::traits::*;

/// Number of stream bytes in accordance to protocol.
pub const STREAM_LEN: usize = 2;
/// Number of body length bytes in accordance to protocol.
pub const LENGTH_LEN: usize = 4;
/// Total size of a frame header: version, flags, stream, opcode and body length.
pub const HEADER_LEN: usize = 9;

pub mod message_error;
pub mod message_query;
pub mod message_response;
pub mod message_result;
pub mod message_startup;
pub mod traits;

/// Stream id reserved for server-pushed events.
pub const EVENT_STREAM_ID: StreamId = -1;
/// The largest stream id usable by requests.
pub const MAX_STREAM_ID: StreamId = i16::MAX;

pub type StreamId = i16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    pub version: Version,
    pub direction: Direction,
    pub flags: Flags,
    pub opcode: Opcode,
    pub stream: StreamId,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(
        version: Version,
        direction: Direction,
        flags: Flags,
        opcode: Opcode,
        stream: StreamId,
        body: Vec<u8>,
    ) -> Self {
        Frame {
            version,
            direction,
            flags,
            opcode,
            stream,
            body,
        }
    }

    /// Creates a STARTUP request. Compression is never negotiated.
    pub fn new_req_startup(version: Version) -> Frame {
        let body = BodyReqStartup::new(version);

        Frame::new(
            version,
            Direction::Request,
            Flags::empty(),
            Opcode::Startup,
            0,
            body.serialize_to_vec(version),
        )
    }

    /// Creates a QUERY request.
    pub fn new_req_query(query: String, query_params: QueryParams, version: Version) -> Frame {
        let body = BodyReqQuery::new(query, query_params);

        Frame::new(
            version,
            Direction::Request,
            Flags::empty(),
            Opcode::Query,
            0,
            body.serialize_to_vec(version),
        )
    }

    /// Returns the consistency this frame was sent with, for QUERY requests.
    pub fn query_consistency(&self) -> Option<Consistency> {
        if self.opcode != Opcode::Query {
            return None;
        }

        BodyReqQuery::consistency_from_body(&self.body)
    }

    /// Parses the response body.
    pub fn response_body(&self) -> error::Result<ResponseBody> {
        ResponseBody::try_from(self.body.as_slice(), self.opcode, self.version)
    }

    /// Encodes the frame for the wire using the given stream id, which is assigned by the
    /// connection the frame is sent over.
    pub fn encode(&self, stream: StreamId) -> Vec<u8> {
        let combined_version_byte = u8::from(self.version) | u8::from(self.direction);

        let mut v = Vec::with_capacity(HEADER_LEN + self.body.len());

        v.push(combined_version_byte);
        v.push(self.flags.bits());
        v.extend_from_slice(&stream.to_be_bytes());
        v.push(u8::from(self.opcode));
        v.extend_from_slice(&(self.body.len() as i32).to_be_bytes());
        v.extend_from_slice(&self.body);

        v
    }
}

#[derive(Debug, PartialEq, Copy, Clone, Ord, PartialOrd, Eq, Hash, Display, Default)]
pub enum Version {
    V3,
    #[default]
    V4,
}

impl From<Version> for u8 {
    fn from(value: Version) -> Self {
        match value {
            Version::V3 => 3,
            Version::V4 => 4,
        }
    }
}

impl TryFrom<u8> for Version {
    type Error = error::Error;

    fn try_from(version: u8) -> Result<Self, Self::Error> {
        match version & 0x7F {
            3 => Ok(Version::V3),
            4 => Ok(Version::V4),
            v => Err(error::Error::General(format!(
                "Unknown protocol version: {v}"
            ))),
        }
    }
}

impl Version {
    /// Number of bytes that represent frame's version.
    pub const BYTE_LENGTH: usize = 1;
}

#[derive(Debug, PartialEq, Copy, Clone, Ord, PartialOrd, Eq, Hash, Display)]
pub enum Direction {
    Request,
    Response,
}

impl From<Direction> for u8 {
    fn from(value: Direction) -> u8 {
        match value {
            Direction::Request => 0x00,
            Direction::Response => 0x80,
        }
    }
}

impl From<u8> for Direction {
    fn from(value: u8) -> Self {
        match value & 0x80 {
            0 => Direction::Request,
            _ => Direction::Response,
        }
    }
}

bitflags! {
    /// Frame header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Flags: u8 {
        const COMPRESSION = 0x01;
        const TRACING = 0x02;
        const CUSTOM_PAYLOAD = 0x04;
        const WARNING = 0x08;
        const BETA = 0x10;
    }
}

impl Flags {
    /// Number of bytes that represent frame's flags.
    pub const BYTE_LENGTH: usize = 1;
}

#[derive(Debug, PartialEq, Copy, Clone, Ord, PartialOrd, Eq, Hash, Display)]
pub enum Opcode {
    Error,
    Startup,
    Ready,
    Authenticate,
    Options,
    Supported,
    Query,
    Result,
    Prepare,
    Execute,
    Register,
    Event,
    Batch,
    AuthChallenge,
    AuthResponse,
    AuthSuccess,
}

impl Opcode {
    /// Number of bytes that represent frame's opcode.
    pub const BYTE_LENGTH: usize = 1;

    /// Checks if the opcode can be sent by a server.
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Opcode::Error
                | Opcode::Ready
                | Opcode::Authenticate
                | Opcode::Supported
                | Opcode::Result
                | Opcode::Event
                | Opcode::AuthChallenge
                | Opcode::AuthSuccess
        )
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Error => 0x00,
            Opcode::Startup => 0x01,
            Opcode::Ready => 0x02,
            Opcode::Authenticate => 0x03,
            Opcode::Options => 0x05,
            Opcode::Supported => 0x06,
            Opcode::Query => 0x07,
            Opcode::Result => 0x08,
            Opcode::Prepare => 0x09,
            Opcode::Execute => 0x0A,
            Opcode::Register => 0x0B,
            Opcode::Event => 0x0C,
            Opcode::Batch => 0x0D,
            Opcode::AuthChallenge => 0x0E,
            Opcode::AuthResponse => 0x0F,
            Opcode::AuthSuccess => 0x10,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = error::Error;

    fn try_from(value: u8) -> Result<Self, <Opcode as TryFrom<u8>>::Error> {
        match value {
            0x00 => Ok(Opcode::Error),
            0x01 => Ok(Opcode::Startup),
            0x02 => Ok(Opcode::Ready),
            0x03 => Ok(Opcode::Authenticate),
            0x05 => Ok(Opcode::Options),
            0x06 => Ok(Opcode::Supported),
            0x07 => Ok(Opcode::Query),
            0x08 => Ok(Opcode::Result),
            0x09 => Ok(Opcode::Prepare),
            0x0A => Ok(Opcode::Execute),
            0x0B => Ok(Opcode::Register),
            0x0C => Ok(Opcode::Event),
            0x0D => Ok(Opcode::Batch),
            0x0E => Ok(Opcode::AuthChallenge),
            0x0F => Ok(Opcode::AuthResponse),
            0x10 => Ok(Opcode::AuthSuccess),
            _ => Err(error::Error::UnknownOpcode(value)),
        }
    }
}
