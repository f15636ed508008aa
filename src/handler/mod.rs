//! Handler Module
//!
//! Maps a decoded request to the encoded response frame.
//!
//! ## Dispatch
//! `HandlerRegistry` is keyed by `MessageKind`. It is built once at startup,
//! wrapped in an `Arc`, and only ever read afterwards, so every connection
//! (on any thread) can share it without locking.

mod kv;
mod registry;

pub use kv::{GetHandler, PutOrUpdateHandler};
pub use registry::HandlerRegistry;

use crate::error::Result;
use crate::protocol::Message;

/// Turns one request into the bytes of its response frame
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, message: Message) -> Result<Vec<u8>>;
}
