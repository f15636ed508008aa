//! TCP Server
//!
//! Binds the listener and runs the event loop over it.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mio::net::TcpListener;

use super::{EventLoop, StopHandle};
use crate::config::Config;
use crate::error::{KvError, Result};
use crate::handler::HandlerRegistry;
use crate::store::InMemoryStore;

/// Event-loop TCP server for EventKV
pub struct Server {
    event_loop: EventLoop,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind the listener and build the event loop.
    ///
    /// Fails before anything runs if the address cannot be resolved or bound,
    /// or the readiness facility cannot be created.
    pub fn bind(config: Config, store: Arc<InMemoryStore>) -> Result<Self> {
        config.validate()?;

        let addr = resolve(&config.listen_addr)?;
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;

        let handlers = Arc::new(HandlerRegistry::for_store(store));
        let event_loop = EventLoop::new(listener, handlers, &config)?;

        tracing::info!("Listening on {}", local_addr);
        Ok(Self {
            event_loop,
            local_addr,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that stops the server from another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.event_loop.stop_handle()
    }

    /// Run the event loop on the calling thread until stopped
    pub fn run(mut self) -> Result<()> {
        let result = self.event_loop.run();
        tracing::info!("Server on {} stopped", self.local_addr);
        result
    }

    /// Run the event loop on a dedicated thread
    pub fn spawn(self) -> Result<ServerHandle> {
        let local_addr = self.local_addr;
        let stop = self.stop_handle();
        let thread = thread::Builder::new()
            .name("eventkv-reactor".to_string())
            .spawn(move || self.run())?;

        Ok(ServerHandle {
            local_addr,
            stop,
            thread: Some(thread),
        })
    }
}

/// A server running on its own thread. Dropping it stops the server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: StopHandle,
    thread: Option<JoinHandle<Result<()>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stop the server, wait for its thread, and return how the loop ended
    pub fn stop(mut self) -> Result<()> {
        self.stop.stop();
        self.join()
    }

    fn join(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| KvError::Io(std::io::Error::other("server thread panicked")))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop.stop();
        if let Err(e) = self.join() {
            tracing::warn!("Server on {} ended with error: {}", self.local_addr, e);
        }
    }
}

/// Resolve a `host:port` string to the first socket address
pub(crate) fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| KvError::Config(format!("address {} resolved to nothing", addr)))
}
