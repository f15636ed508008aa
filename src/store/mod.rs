//! Store Module
//!
//! In-memory key/value map consulted by the request handlers.
//!
//! ## Concurrency
//! The event loop touches the store from one thread only, but the
//! thread-per-connection server shares it across workers, so the map sits
//! behind a `parking_lot::RwLock` (many readers, one writer).

mod memory;

pub use memory::InMemoryStore;
