//! Network Module
//!
//! TCP servers and per-connection handling.
//!
//! ## Architecture
//! - `EventLoop`: one thread, non-blocking sockets, kernel readiness
//!   notification (the default server)
//! - `ThreadedServer`: blocking sockets, one thread per connection
//!
//! Both speak the same framing and share one immutable `HandlerRegistry`.

mod connection;
mod event_loop;
mod reactor;
mod server;
mod shutdown;
mod threaded;

pub use connection::{Connection, ConnectionState, DriveOutcome, DEFAULT_MAX_PENDING_WRITE};
pub use event_loop::{drain_backlog, AcceptDrain, EventLoop, MAX_ACCEPT_FAILURES};
pub use reactor::{MioReactor, Reactor, ReadinessEvent, WakeHandle};
pub use server::{Server, ServerHandle};
pub use shutdown::StopHandle;
pub use threaded::ThreadedServer;
