use crate::frame::message_error::ErrorBody;
use crate::frame::Opcode;
use crate::types::{CInt, CIntShort};
use itertools::Itertools;
use std::io;
use std::net::SocketAddr;
use std::result;
use std::str::Utf8Error;
use std::string::FromUtf8Error;
use thiserror::Error as ThisError;
use uuid::Error as UuidError;

pub type Result<T> = result::Result<T, Error>;

/// Driver error type. Two broad families exist: errors returned by a server in ERROR frames
/// (`Server`) and errors raised within the driver itself. The driver-side family is further split
/// into connectivity failures, which the query executor recovers from by moving to another host,
/// and everything else, which is surfaced to the caller as-is.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Internal IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Internal error that may be raised during `uuid::Uuid::from_slice`.
    #[error("Uuid parse error: {0}")]
    UuidParse(#[from] UuidError),
    /// General error.
    #[error("General error: {0}")]
    General(String),
    /// Internal error that may be raised during `String::from_utf8`.
    #[error("FromUtf8 error: {0}")]
    FromUtf8(#[from] FromUtf8Error),
    /// Internal error that may be raised during `str::from_utf8`.
    #[error("Utf8 error: {0}")]
    Utf8(#[from] Utf8Error),
    /// Server error.
    #[error("Server {addr} error: {body}")]
    Server { body: ErrorBody, addr: SocketAddr },
    /// Timed out waiting for an operation to complete.
    #[error("Timeout: {0}")]
    Timeout(String),
    /// The connection to a node was closed while a request was being written or awaited.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),
    /// The node is currently considered down and no reconnection probe is due.
    #[error("Host {0} is down")]
    HostDown(SocketAddr),
    /// Every host in the query plan failed.
    #[error("No host available: {}", format_host_errors(.errors))]
    NoHostAvailable { errors: Vec<(SocketAddr, Error)> },
    /// The load balancing strategy returned a plan without any hosts.
    #[error("Query plan is empty")]
    EmptyQueryPlan,
    /// Invalid driver configuration, detected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Unknown consistency.
    #[error("Unknown consistency: {0}")]
    UnknownConsistency(CIntShort),
    /// Unexpected additional error info.
    #[error("Unexpected error code: {0}")]
    UnexpectedErrorCode(CInt),
    /// Unexpected write type.
    #[error("Unexpected write type: {0}")]
    UnexpectedWriteType(String),
    /// Expected a response opcode, got something else.
    #[error("Opcode is not a response: {0}")]
    NonResponseOpcode(Opcode),
    /// Unknown opcode byte.
    #[error("Unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),
    /// Unexpected result kind.
    #[error("Unexpected result kind: {0}")]
    UnexpectedResultKind(CInt),
    /// Unexpected column type.
    #[error("Unexpected column type: {0}")]
    UnexpectedColumnType(CIntShort),
    /// Unexpected startup response.
    #[error("Unexpected startup response: {0}")]
    UnexpectedStartupResponse(Opcode),
    /// A column with the given name does not exist in the result set.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),
    /// The result set contains more than one column with the given name.
    #[error("Ambiguous column name: {0}")]
    AmbiguousColumn(String),
    /// Column ordinal outside of the result set.
    #[error("Column index {index} out of range (column count: {count})")]
    ColumnIndexOutOfRange { index: usize, count: usize },
    /// A cell was accessed while the cursor was not positioned on a row.
    #[error("Cursor is not positioned on a row")]
    NoCurrentRow,
    /// A typed getter was used on a column of an incompatible type.
    #[error("Column {column} cannot be read as {requested}")]
    IncompatibleColumnType {
        column: String,
        requested: &'static str,
    },
}

fn format_host_errors(errors: &[(SocketAddr, Error)]) -> String {
    if errors.is_empty() {
        return "no hosts were tried".into();
    }

    errors
        .iter()
        .map(|(addr, error)| format!("{addr}: {error}"))
        .join("; ")
}

impl Error {
    /// Checks if the error is a failure to reach a node, rather than a failure reported by it.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::ConnectionClosed(_) | Error::HostDown(_)
        )
    }

    /// Returns the server error body, if the error originated from a server.
    #[inline]
    pub fn server_body(&self) -> Option<&ErrorBody> {
        match self {
            Error::Server { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::General(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Error {
        Error::General(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn should_classify_connectivity_errors() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9042);

        assert!(Error::HostDown(addr).is_connectivity());
        assert!(Error::ConnectionClosed("reset".into()).is_connectivity());
        assert!(Error::Io(io::Error::from(io::ErrorKind::ConnectionRefused)).is_connectivity());
        assert!(!Error::Timeout("slow".into()).is_connectivity());
        assert!(!Error::EmptyQueryPlan.is_connectivity());
    }

    #[test]
    fn should_list_every_host_in_no_host_available() {
        let first = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 9042);
        let second = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)), 9042);
        let error = Error::NoHostAvailable {
            errors: vec![(first, Error::HostDown(first)), (second, Error::HostDown(second))],
        };

        let message = error.to_string();
        assert!(message.contains("127.0.0.1:9042"));
        assert!(message.contains("127.0.0.2:9042"));
    }
}
