//! Wire-level types of the native database protocol: frames, the messages exchanged over them,
//! consistency levels and value codecs. Built in coordination with `cqlink-tokio`.

pub mod frame;
pub mod types;

pub mod consistency;
pub mod error;

pub type Error = error::Error;
pub type Result<T> = error::Result<T>;
