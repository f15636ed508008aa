//! Event Loop
//!
//! Single-threaded dispatcher. Owns the listening socket, the reactor and
//! every `Connection`; nothing else touches them, so no locks are needed.
//!
//! ## Loop
//! 1. Poll the reactor (the only place the thread blocks)
//! 2. Listener ready: accept until the backlog is empty
//! 3. Client ready: drive its connection until it would block
//! 4. Connection failed, or peer gone with nothing left to send: unsubscribe,
//!    close and forget it in one step
//!
//! Stopping is advisory: `StopHandle::stop` sets a flag and fires the wake-up
//! descriptor, and the loop exits at the top of its next iteration.

use std::collections::{HashMap, HashSet};
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::Token;

use super::connection::{Connection, ConnectionState, DriveOutcome};
use super::reactor::{MioReactor, Reactor, ReadinessEvent, FIRST_CONNECTION, LISTENER, WAKER};
use super::StopHandle;
use crate::config::Config;
use crate::error::Result;
use crate::handler::HandlerRegistry;

/// Consecutive accept failures tolerated before handing back to the poll
pub const MAX_ACCEPT_FAILURES: usize = 32;

/// How a drain of the listener backlog ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptDrain {
    /// `accept` reported would-block
    Empty,
    /// `MAX_ACCEPT_FAILURES` accepts failed in a row; the backlog may not be empty
    TooManyFailures,
}

/// Call `accept` until the backlog is empty, handing each socket to `on_accept`.
///
/// The listener is edge-triggered, so a failed accept (e.g. out of
/// descriptors) is logged and the drain goes on; anything left in the backlog
/// would otherwise get no further notification. The drain only gives up after
/// `MAX_ACCEPT_FAILURES` failures in a row, and the caller then re-arms the
/// listener.
pub fn drain_backlog<T>(
    mut accept: impl FnMut() -> io::Result<T>,
    mut on_accept: impl FnMut(T),
) -> AcceptDrain {
    let mut failures = 0;
    loop {
        match accept() {
            Ok(socket) => {
                failures = 0;
                on_accept(socket);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return AcceptDrain::Empty,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                failures += 1;
                if failures >= MAX_ACCEPT_FAILURES {
                    return AcceptDrain::TooManyFailures;
                }
            }
        }
    }
}

/// Readiness-driven connection multiplexer
pub struct EventLoop<R: Reactor = MioReactor> {
    listener: Option<TcpListener>,
    reactor: R,
    connections: HashMap<Token, Connection<TcpStream>>,

    /// Connections currently subscribed for write readiness
    awaiting_writable: HashSet<Token>,

    handlers: Arc<HandlerRegistry>,
    stop: StopHandle,
    next_token: usize,
    read_chunk_size: usize,
    max_pending_write: usize,
    poll_timeout: Option<Duration>,
}

impl EventLoop<MioReactor> {
    /// Build a loop over the platform's readiness facility
    pub fn new(
        listener: TcpListener,
        handlers: Arc<HandlerRegistry>,
        config: &Config,
    ) -> Result<Self> {
        let reactor = MioReactor::create(config.max_clients)?;
        Self::with_reactor(listener, reactor, handlers, config)
    }
}

impl<R: Reactor> EventLoop<R> {
    /// Build a loop over an existing reactor and subscribe the listener
    pub fn with_reactor(
        mut listener: TcpListener,
        reactor: R,
        handlers: Arc<HandlerRegistry>,
        config: &Config,
    ) -> Result<Self> {
        reactor.subscribe_read(&mut listener, LISTENER)?;
        let stop = StopHandle::for_reactor(reactor.wake_handle());

        Ok(Self {
            listener: Some(listener),
            reactor,
            connections: HashMap::new(),
            awaiting_writable: HashSet::new(),
            handlers,
            stop,
            next_token: FIRST_CONNECTION.0,
            read_chunk_size: config.read_chunk_size,
            max_pending_write: config.max_pending_write_bytes,
            poll_timeout: config.poll_timeout(),
        })
    }

    /// Handle that stops this loop from another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Run until stopped. Reactor failures end the loop and are returned;
    /// per-connection failures never are.
    pub fn run(&mut self) -> Result<()> {
        tracing::info!("Event loop running");

        let result = self.run_until_stopped();
        if let Err(e) = &result {
            tracing::error!("Event loop failed: {}", e);
        }

        self.stop();
        result
    }

    fn run_until_stopped(&mut self) -> Result<()> {
        while !self.stop.is_stopped() {
            let events = self.reactor.poll(self.poll_timeout)?;
            for event in events {
                self.dispatch(event);
            }
        }
        Ok(())
    }

    /// Stop the loop and release every descriptor it owns. Idempotent.
    pub fn stop(&mut self) {
        self.stop.request_stop();

        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        if !tokens.is_empty() {
            tracing::info!("Closing {} live connections", tokens.len());
        }
        for token in tokens {
            self.close_connection(token);
        }

        if let Some(mut listener) = self.listener.take() {
            self.reactor.unsubscribe(&mut listener);
            tracing::info!("Listener closed");
        }
    }

    fn dispatch(&mut self, event: ReadinessEvent) {
        match event.token {
            // Only there to cut the wait short; the stop flag is checked by the loop
            WAKER => {}
            LISTENER => {
                if let Err(e) = self.accept_pending() {
                    tracing::error!("Could not re-arm listener: {}", e);
                }
            }
            token => self.service_connection(token, event),
        }
    }

    /// Accept every pending connection; one notification may stand for several
    fn accept_pending(&mut self) -> Result<()> {
        let Some(listener) = self.listener.as_ref() else {
            return Ok(());
        };

        let mut accepted = Vec::new();
        let drain = drain_backlog(|| listener.accept(), |socket| accepted.push(socket));

        // mio hands out accepted sockets already in non-blocking mode
        for (stream, peer_addr) in accepted {
            self.register_connection(stream, peer_addr);
        }

        if drain == AcceptDrain::TooManyFailures {
            self.rearm_listener()?;
        }
        Ok(())
    }

    fn register_connection(&mut self, mut stream: TcpStream, peer_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not disable Nagle for {}: {}", peer_addr, e);
        }

        let token = self.allocate_token();
        if let Err(e) = self.reactor.subscribe_read(&mut stream, token) {
            tracing::warn!("Could not subscribe {}: {}", peer_addr, e);
            return;
        }

        self.connections.insert(
            token,
            Connection::new(
                stream,
                peer_addr.to_string(),
                Arc::clone(&self.handlers),
                self.read_chunk_size,
            )
            .with_max_pending_write(self.max_pending_write),
        );
        tracing::info!(
            token = token.0,
            "Accepted {} ({} live)",
            peer_addr,
            self.connections.len()
        );
    }

    /// Re-register the listener so a non-empty backlog is reported again
    fn rearm_listener(&mut self) -> Result<()> {
        if let Some(listener) = self.listener.as_mut() {
            self.reactor.resubscribe(listener, LISTENER, false)?;
        }
        Ok(())
    }

    fn allocate_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    fn service_connection(&mut self, token: Token, event: ReadinessEvent) {
        let Some(connection) = self.connections.get_mut(&token) else {
            // Already closed earlier in this batch
            tracing::trace!(token = token.0, "Event for unknown connection");
            return;
        };

        let mut failed = false;

        if event.writable {
            if let Err(e) = connection.flush() {
                tracing::warn!("Write to {} failed: {}", connection.peer_addr(), e);
                failed = true;
            }
        }

        // Drive on every event: a drained write queue may release frames
        // and unread bytes that will not be announced again
        if !failed {
            loop {
                match connection.drive() {
                    DriveOutcome::Progressed => continue,
                    DriveOutcome::WouldBlock | DriveOutcome::PeerClosed => break,
                    DriveOutcome::FatalError(e) => {
                        tracing::warn!("Dropping {}: {}", connection.peer_addr(), e);
                        failed = true;
                        break;
                    }
                }
            }
        }

        // A peer that stopped sending still gets the responses queued for it
        let peer_done = event.eof_hint || connection.state() == ConnectionState::Closing;
        if failed || (peer_done && !connection.wants_write()) {
            self.close_connection(token);
            return;
        }

        let wants_write = connection.wants_write();
        if wants_write != self.awaiting_writable.contains(&token) {
            self.update_write_interest(token, wants_write);
        }
    }

    fn update_write_interest(&mut self, token: Token, writable: bool) {
        let Some(stream) = self
            .connections
            .get_mut(&token)
            .and_then(|connection| connection.stream_mut())
        else {
            return;
        };

        match self.reactor.resubscribe(stream, token, writable) {
            Ok(()) if writable => {
                self.awaiting_writable.insert(token);
            }
            Ok(()) => {
                self.awaiting_writable.remove(&token);
            }
            Err(e) => {
                tracing::warn!(token = token.0, "Could not change interest: {}", e);
                self.close_connection(token);
            }
        }
    }

    /// Unsubscribe, close and forget a connection in one step
    fn close_connection(&mut self, token: Token) {
        let Some(mut connection) = self.connections.remove(&token) else {
            return;
        };

        if let Some(stream) = connection.stream_mut() {
            self.reactor.unsubscribe(stream);
        }
        connection.close();
        self.awaiting_writable.remove(&token);

        tracing::info!(
            token = token.0,
            "Connection {} closed ({} live)",
            connection.peer_addr(),
            self.connections.len()
        );
    }
}
