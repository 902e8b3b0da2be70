//! Length-prefixed framing.
//!
//! Each frame is a 32-bit big-endian payload length followed by the payload.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{GraphError, Result};

/// Size of the frame length prefix in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest frame length representable by the prefix.
pub const MAX_FRAME_LENGTH: u32 = u32::MAX;

fn check_length(len: usize, max_frame_length: u32) -> Result<()> {
    if len > max_frame_length as usize {
        return Err(GraphError::FrameTooLarge {
            size: len,
            max: max_frame_length as usize,
        });
    }
    Ok(())
}

/// Read one frame payload from a stream.
pub fn read_frame<R: Read>(reader: &mut R, max_frame_length: u32) -> Result<Bytes> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let len = u32::from_be_bytes(header) as usize;
    check_length(len, max_frame_length)?;

    let mut payload = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut payload)?;
    }

    Ok(Bytes::from(payload))
}

/// Append one framed payload to a buffer.
pub fn encode_frame(buf: &mut BytesMut, payload: &[u8], max_frame_length: u32) -> Result<()> {
    check_length(payload.len(), max_frame_length)?;
    buf.reserve(FRAME_HEADER_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    Ok(())
}

/// Write one framed payload to a stream.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8], max_frame_length: u32) -> Result<()> {
    check_length(payload.len(), max_frame_length)?;
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}
