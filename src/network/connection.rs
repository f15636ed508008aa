//! Connection State
//!
//! Per-descriptor read/write state machine for a non-blocking socket.
//!
//! ```text
//!            bytes, no full frame
//!   Idle ───────────────────────────► Accumulating
//!    ▲                                    │
//!    └──────── frame(s) consumed ─────────┘
//!
//!   Idle / Accumulating ── EOF, I/O error, bad frame ──► Closing
//! ```
//!
//! Each `drive()` does one read. Whatever arrived is appended to the
//! accumulator and every complete frame in it is dispatched in arrival
//! order. Bytes past the last complete frame stay for the next read.
//!
//! Responses the socket cannot take yet are queued. Once the queue reaches
//! its limit the connection stops answering and stops reading, so a peer
//! that never reads is held back by its own socket buffers.

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use bytes::{Buf, BytesMut};

use crate::error::{KvError, Result};
use crate::handler::HandlerRegistry;
use crate::protocol::decode;

/// Queued response bytes at which a connection stops reading
pub const DEFAULT_MAX_PENDING_WRITE: usize = 1024 * 1024;

/// Where a connection sits in its read cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No partial frame buffered
    Idle,
    /// Holding the start of a frame
    Accumulating,
    /// Terminal
    Closing,
}

/// Result of one `drive()` call
#[derive(Debug)]
pub enum DriveOutcome {
    /// Bytes were read; call again
    Progressed,
    /// Nothing to read right now
    WouldBlock,
    /// Peer closed its write side
    PeerClosed,
    /// I/O failure or an unrecoverable frame
    FatalError(KvError),
}

/// State owned for one accepted socket
pub struct Connection<S> {
    /// `None` once closed, so the descriptor cannot be touched again
    stream: Option<S>,

    /// Peer address for logging
    peer_addr: String,

    state: ConnectionState,

    /// Bytes read but not yet decoded
    inbound: BytesMut,

    /// Response bytes the socket has not accepted yet
    outbound: BytesMut,

    /// Reading pauses while `outbound` holds at least this many bytes
    max_pending_write: usize,

    /// Scratch space for one read
    chunk: Vec<u8>,

    handlers: Arc<HandlerRegistry>,
}

impl<S: Read + Write> Connection<S> {
    /// Wrap an accepted, already non-blocking stream
    pub fn new(
        stream: S,
        peer_addr: impl Into<String>,
        handlers: Arc<HandlerRegistry>,
        read_chunk_size: usize,
    ) -> Self {
        Self {
            stream: Some(stream),
            peer_addr: peer_addr.into(),
            state: ConnectionState::Idle,
            inbound: BytesMut::with_capacity(read_chunk_size),
            outbound: BytesMut::new(),
            max_pending_write: DEFAULT_MAX_PENDING_WRITE,
            chunk: vec![0u8; read_chunk_size.max(1)],
            handlers,
        }
    }

    /// Set how many queued response bytes pause reading (at least 1)
    pub fn with_max_pending_write(mut self, limit: usize) -> Self {
        self.max_pending_write = limit.max(1);
        self
    }

    /// Perform one non-blocking read and handle every frame it completes.
    ///
    /// Frames held back by a full write queue are answered first. While the
    /// queue stays full nothing is read and `WouldBlock` is returned.
    pub fn drive(&mut self) -> DriveOutcome {
        if self.stream.is_none() {
            return DriveOutcome::PeerClosed;
        }

        if let Err(e) = self.flush().and_then(|()| self.process_frames()) {
            return self.fail(e);
        }
        if self.write_backlogged() {
            tracing::trace!(
                "{} response bytes queued for {}, not reading",
                self.outbound.len(),
                self.peer_addr
            );
            return DriveOutcome::WouldBlock;
        }
        if self.state == ConnectionState::Closing {
            return DriveOutcome::PeerClosed;
        }

        let Some(stream) = self.stream.as_mut() else {
            return DriveOutcome::PeerClosed;
        };
        let n = match stream.read(&mut self.chunk) {
            Ok(0) => {
                tracing::debug!("Client {} closed its side", self.peer_addr);
                self.state = ConnectionState::Closing;
                return DriveOutcome::PeerClosed;
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return DriveOutcome::WouldBlock,
            Err(e) if e.kind() == ErrorKind::Interrupted => return DriveOutcome::Progressed,
            Err(e) => return self.fail(e.into()),
        };

        tracing::trace!("Read {} bytes from {}", n, self.peer_addr);
        self.inbound.extend_from_slice(&self.chunk[..n]);
        self.state = ConnectionState::Accumulating;

        match self.process_frames() {
            Ok(()) => DriveOutcome::Progressed,
            Err(e) => self.fail(e),
        }
    }

    /// Nothing buffered survives a fatal error
    fn fail(&mut self, e: KvError) -> DriveOutcome {
        self.state = ConnectionState::Closing;
        self.inbound.clear();
        self.outbound.clear();
        DriveOutcome::FatalError(e)
    }

    /// Decode and answer frames until none is complete or the write queue is full
    fn process_frames(&mut self) -> Result<()> {
        while !self.write_backlogged() {
            let Some((message, consumed)) = decode(&self.inbound)? else {
                break;
            };
            self.inbound.advance(consumed);

            let kind = message.kind();
            tracing::debug!("Received {:?} from {}", kind, self.peer_addr);

            // A failed handler costs this frame its response, not the connection
            match self.handlers.dispatch(message) {
                Ok(response) => {
                    self.outbound.extend_from_slice(&response);
                    self.flush()?;
                }
                Err(e) => {
                    tracing::warn!("Handler for {:?} from {} failed: {}", kind, self.peer_addr, e);
                }
            }
        }

        if self.inbound.is_empty() && self.state != ConnectionState::Closing {
            self.state = ConnectionState::Idle;
        }
        Ok(())
    }

    /// Write as much queued response data as the socket takes without blocking
    pub fn flush(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        while !self.outbound.is_empty() {
            match stream.write(&self.outbound) {
                Ok(0) => {
                    return Err(KvError::Io(std::io::Error::new(
                        ErrorKind::WriteZero,
                        "socket accepted no bytes",
                    )))
                }
                Ok(n) => self.outbound.advance(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if !self.outbound.is_empty() {
            tracing::trace!(
                "{} response bytes pending for {}",
                self.outbound.len(),
                self.peer_addr
            );
        }
        Ok(())
    }

    /// True while response bytes wait for the socket to become writable
    pub fn wants_write(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// True while the write queue is full enough to pause reading
    pub fn write_backlogged(&self) -> bool {
        self.outbound.len() >= self.max_pending_write
    }

    /// Release the socket and discard buffered state. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("Closed connection to {}", self.peer_addr);
        }
        self.inbound.clear();
        self.outbound.clear();
        self.state = ConnectionState::Closing;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Bytes of an incomplete frame currently held
    pub fn buffered_len(&self) -> usize {
        self.inbound.len()
    }

    /// Response bytes not yet written
    pub fn pending_write_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    pub fn stream(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    pub fn stream_mut(&mut self) -> Option<&mut S> {
        self.stream.as_mut()
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
