//! Readiness Queue
//!
//! Thin wrapper over the OS readiness-notification facility. `MioReactor`
//! goes through `mio::Poll`, which is epoll on Linux, kqueue on the BSDs and
//! macOS, and IOCP on Windows, so the event loop never sees the platform.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Token, Waker};

use crate::error::Result;

/// Token of the listening socket
pub const LISTENER: Token = Token(0);

/// Token of the wake-up descriptor
pub const WAKER: Token = Token(1);

/// First token handed to an accepted connection
pub const FIRST_CONNECTION: Token = Token(2);

/// One descriptor reported ready by `poll`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessEvent {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    /// Peer hung up or the socket is in error
    pub eof_hint: bool,
}

/// Handle that interrupts a blocked `poll` from any thread
#[derive(Clone)]
pub struct WakeHandle {
    waker: Arc<Waker>,
}

impl WakeHandle {
    pub fn wake(&self) -> Result<()> {
        self.waker.wake()?;
        Ok(())
    }
}

/// The readiness-notification capability the event loop is written against
pub trait Reactor {
    /// Start reporting read readiness for `source`
    fn subscribe_read(&self, source: &mut dyn Source, token: Token) -> Result<()>;

    /// Change the interest of an already subscribed `source`.
    /// Read readiness is always kept; write readiness is added when `writable`.
    fn resubscribe(&self, source: &mut dyn Source, token: Token, writable: bool) -> Result<()>;

    /// Stop reporting `source`. Best-effort: the kernel may already have
    /// dropped it when the descriptor was closed.
    fn unsubscribe(&self, source: &mut dyn Source);

    /// Block until at least one subscribed descriptor is ready, a wake-up
    /// arrives, or `timeout` elapses (`None` waits forever)
    fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<ReadinessEvent>>;

    /// Handle for breaking `poll` out of its wait
    fn wake_handle(&self) -> WakeHandle;
}

/// `Reactor` backed by `mio::Poll`
pub struct MioReactor {
    poll: Poll,
    events: Events,
    waker: Arc<Waker>,
}

impl MioReactor {
    /// Create the kernel queue. `capacity` bounds the events returned per poll.
    pub fn create(capacity: usize) -> Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        Ok(Self {
            poll,
            events: Events::with_capacity(capacity.max(1)),
            waker,
        })
    }
}

impl Reactor for MioReactor {
    fn subscribe_read(&self, source: &mut dyn Source, token: Token) -> Result<()> {
        self.poll
            .registry()
            .register(source, token, Interest::READABLE)?;
        Ok(())
    }

    fn resubscribe(&self, source: &mut dyn Source, token: Token, writable: bool) -> Result<()> {
        let interest = if writable {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        self.poll.registry().reregister(source, token, interest)?;
        Ok(())
    }

    fn unsubscribe(&self, source: &mut dyn Source) {
        if let Err(e) = self.poll.registry().deregister(source) {
            tracing::trace!("deregister ignored: {}", e);
        }
    }

    fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<ReadinessEvent>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            // A signal landed mid-wait; report nothing so the caller re-checks its flags
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }

        Ok(self
            .events
            .iter()
            .map(|event| ReadinessEvent {
                token: event.token(),
                readable: event.is_readable(),
                writable: event.is_writable(),
                eof_hint: event.is_read_closed() || event.is_error(),
            })
            .collect())
    }

    fn wake_handle(&self) -> WakeHandle {
        WakeHandle {
            waker: Arc::clone(&self.waker),
        }
    }
}
