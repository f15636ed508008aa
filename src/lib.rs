//! # EventKV
//!
//! An in-memory key-value server with:
//! - A length-prefixed, footer-terminated binary wire protocol
//! - A single-threaded event loop over kernel readiness notification
//!   (epoll / kqueue / IOCP through mio)
//! - A per-connection state machine reassembling fragmented frames
//! - A thread-per-connection blocking variant speaking the same protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Event Loop (1 thread)                    │
//! │         poll ─► accept / drive connection / close            │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │                              │
//!            ▼                              ▼
//!   ┌─────────────────┐          ┌──────────────────────┐
//!   │     Reactor     │          │  Connection (per fd) │
//!   │  (mio::Poll)    │          │  accumulator + codec │
//!   └─────────────────┘          └──────────┬───────────┘
//!                                           │
//!                                           ▼
//!                                ┌──────────────────────┐
//!                                │   HandlerRegistry    │
//!                                │  Get / PutOrUpdate   │
//!                                └──────────┬───────────┘
//!                                           │
//!                                           ▼
//!                                ┌──────────────────────┐
//!                                │    InMemoryStore     │
//!                                └──────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod store;
pub mod handler;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::Config;
pub use client::Client;
pub use network::{Server, ServerHandle, StopHandle, ThreadedServer};
pub use store::InMemoryStore;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of EventKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
