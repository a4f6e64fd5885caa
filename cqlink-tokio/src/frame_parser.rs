use std::convert::TryFrom;
use std::io::{Cursor, Read};
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tracing::*;

use cqlink_protocol::error;
use cqlink_protocol::frame::{
    Direction, Flags, Frame, Opcode, Version, LENGTH_LEN, STREAM_LEN,
};
use cqlink_protocol::types::{
    from_cursor_string_list, try_i16_from_bytes, try_i32_from_bytes, UUID_LEN,
};

/// Largest body a server is allowed to send.
pub const MAX_FRAME_BODY_LEN: usize = 256 * 1024 * 1024;

/// Reads a single frame. Tracing ids and warnings are stripped from the body, warnings get logged.
pub async fn parse_frame<T: AsyncReadExt + Unpin>(cursor: &mut T) -> error::Result<Frame> {
    let mut version_bytes = [0; Version::BYTE_LENGTH];
    let mut flag_bytes = [0; Flags::BYTE_LENGTH];
    let mut opcode_bytes = [0; Opcode::BYTE_LENGTH];
    let mut stream_bytes = [0; STREAM_LEN];
    let mut length_bytes = [0; LENGTH_LEN];

    // NOTE: order of reads matters
    cursor.read_exact(&mut version_bytes).await?;
    cursor.read_exact(&mut flag_bytes).await?;
    cursor.read_exact(&mut stream_bytes).await?;
    cursor.read_exact(&mut opcode_bytes).await?;
    cursor.read_exact(&mut length_bytes).await?;

    let version = Version::try_from(version_bytes[0])?;
    let direction = Direction::from(version_bytes[0]);
    let flags = Flags::from_bits_truncate(flag_bytes[0]);
    let stream = try_i16_from_bytes(&stream_bytes)?;
    let opcode = Opcode::try_from(opcode_bytes[0])?;
    let length = try_i32_from_bytes(&length_bytes)?;

    let length = usize::try_from(length)
        .ok()
        .filter(|length| *length <= MAX_FRAME_BODY_LEN)
        .ok_or_else(|| error::Error::General(format!("Invalid frame body length: {length}")))?;

    if flags.contains(Flags::COMPRESSION) {
        return Err(error::Error::General(
            "Received a compressed frame, but compression was never negotiated".into(),
        ));
    }

    let mut body_bytes = vec![0; length];
    cursor.read_exact(&mut body_bytes).await?;

    let mut body_cursor = Cursor::new(body_bytes.as_slice());

    if flags.contains(Flags::TRACING) {
        let mut tracing_bytes = [0; UUID_LEN];
        Read::read_exact(&mut body_cursor, &mut tracing_bytes)?;
    }

    if flags.contains(Flags::WARNING) {
        for warning in from_cursor_string_list(&mut body_cursor)? {
            warn!(stream, %warning, "Server warning");
        }
    }

    let mut body = vec![];
    Read::read_to_end(&mut body_cursor, &mut body)?;

    Ok(Frame::new(version, direction, flags, opcode, stream, body))
}

/// Turns ERROR responses into [`Error::Server`](error::Error::Server).
pub fn convert_frame_into_result(frame: Frame, addr: SocketAddr) -> error::Result<Frame> {
    match frame.opcode {
        Opcode::Error => {
            let body = frame.response_body()?.into_error().ok_or_else(|| {
                error::Error::General("Error frame without an error body".into())
            })?;

            Err(error::Error::Server { body, addr })
        }
        _ => Ok(frame),
    }
}
