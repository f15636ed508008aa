//! Buffered frame reader for blocking streams
//!
//! Unlike `read_message`, a read that times out halfway through a frame
//! loses nothing: bytes already received stay buffered for the next call.

use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};

use super::{decode, Message};
use crate::error::{KvError, Result};

/// Accumulates bytes from a blocking reader until whole frames are available
pub struct FrameReader<R> {
    inner: R,
    buffer: BytesMut,
    chunk: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R, chunk_size: usize) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(chunk_size),
            chunk: vec![0u8; chunk_size.max(1)],
        }
    }

    /// Read the next message
    ///
    /// Returns `Ok(None)` when the peer closed cleanly between frames.
    /// Timeouts surface as `KvError::Io` and keep any partial frame.
    pub fn read_frame(&mut self) -> Result<Option<Message>> {
        loop {
            if let Some((message, consumed)) = decode(&self.buffer)? {
                self.buffer.advance(consumed);
                return Ok(Some(message));
            }

            let n = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(KvError::Io(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("peer closed with {} bytes of a partial frame", self.buffer.len()),
                )));
            }

            self.buffer.extend_from_slice(&self.chunk[..n]);
        }
    }

    /// Bytes received but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
