//! Protocol codec
//!
//! Encoding and decoding of single frames. Pure functions, no I/O, apart from
//! the two blocking stream helpers at the bottom.
//!
//! ## Wire Format
//! ```text
//! ┌──────────────┬──────────────────────────────┬──────────────┐
//! │ Len (4, LE)  │  Body (bincode Message)      │   "@EOF@"    │
//! └──────────────┴──────────────────────────────┴──────────────┘
//! ```
//!
//! ### Body Layout (bincode, fixed-width little-endian integers)
//! - kind:   u32
//! - key:    u64 length + UTF-8 bytes
//! - value:  u64 length + UTF-8 bytes
//! - status: u32

use std::io::{Read, Write};

use bincode::Options;
use bytes::{Buf, BufMut};

use super::Message;
use crate::error::{KvError, Result};

/// Header size: 4 byte little-endian length
pub const HEADER_SIZE: usize = 4;

/// Trailing marker closing every frame
pub const FOOTER: &[u8] = b"@EOF@";

/// Footer size in bytes
pub const FOOTER_SIZE: usize = FOOTER.len();

/// Maximum value of the length field (16 MB)
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

fn body_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

/// Check a header-declared length against the frame bounds
fn validate_frame_len(frame_len: u32) -> Result<usize> {
    if frame_len > MAX_FRAME_SIZE {
        return Err(KvError::Decode(format!(
            "Frame too large: {} bytes (max {})",
            frame_len, MAX_FRAME_SIZE
        )));
    }
    if (frame_len as usize) < FOOTER_SIZE {
        return Err(KvError::Decode(format!(
            "Frame length {} shorter than footer",
            frame_len
        )));
    }
    Ok(frame_len as usize)
}

// =============================================================================
// Frame Encoding/Decoding
// =============================================================================

/// Encode a message into one frame
///
/// Format: len (4) + body + footer, where len = body + footer
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    let body = body_options()
        .serialize(message)
        .map_err(|e| KvError::Encode(e.to_string()))?;

    let frame_len = body.len() + FOOTER_SIZE;
    if frame_len > MAX_FRAME_SIZE as usize {
        return Err(KvError::Encode(format!(
            "Message too large: {} bytes (max {})",
            frame_len, MAX_FRAME_SIZE
        )));
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + frame_len);
    frame.put_u32_le(frame_len as u32);
    frame.put_slice(&body);
    frame.put_slice(FOOTER);

    Ok(frame)
}

/// Decode the first frame in `bytes`
///
/// Returns the message and number of bytes consumed, or `None` when `bytes`
/// does not yet hold a whole frame. Bytes past the frame are left untouched.
pub fn decode(bytes: &[u8]) -> Result<Option<(Message, usize)>> {
    if bytes.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = &bytes[..HEADER_SIZE];
    let frame_len = validate_frame_len(header.get_u32_le())?;

    let total_len = HEADER_SIZE + frame_len;
    if bytes.len() < total_len {
        return Ok(None);
    }

    let body_end = total_len - FOOTER_SIZE;
    let footer = &bytes[body_end..total_len];
    if footer != FOOTER {
        return Err(KvError::Decode(format!(
            "Footer mismatch: expected {:?}, got {:?}",
            FOOTER, footer
        )));
    }

    let message = body_options()
        .deserialize(&bytes[HEADER_SIZE..body_end])
        .map_err(|e| KvError::Decode(e.to_string()))?;

    Ok(Some((message, total_len)))
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete message from a blocking stream
///
/// Blocks until a complete frame is received or an error occurs
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let frame_len = validate_frame_len(u32::from_le_bytes(header))?;

    let mut frame = vec![0u8; HEADER_SIZE + frame_len];
    frame[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut frame[HEADER_SIZE..])?;

    match decode(&frame)? {
        Some((message, _)) => Ok(message),
        None => Err(KvError::Decode("Incomplete frame".to_string())),
    }
}

/// Write a message to a blocking stream
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let bytes = encode(message)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
