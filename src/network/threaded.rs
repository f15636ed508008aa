//! Thread-per-connection server
//!
//! Blocking sockets, one worker thread per client. Workers read with a short
//! timeout so they notice a stop request without a wake-up descriptor.

use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::server::resolve;
use super::StopHandle;
use crate::config::Config;
use crate::error::{KvError, Result};
use crate::handler::HandlerRegistry;
use crate::protocol::FrameReader;
use crate::store::InMemoryStore;

/// Blocking TCP server spawning a thread per accepted connection
pub struct ThreadedServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    handlers: Arc<HandlerRegistry>,
    config: Config,
    stop: StopHandle,
}

impl ThreadedServer {
    /// Bind the listener. Nothing is accepted until `run`.
    pub fn bind(config: Config, store: Arc<InMemoryStore>) -> Result<Self> {
        Self::with_handlers(config, HandlerRegistry::for_store(store))
    }

    /// Bind the listener and serve requests through `handlers`
    pub fn with_handlers(config: Config, handlers: HandlerRegistry) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(resolve(&config.listen_addr)?)?;
        let local_addr = listener.local_addr()?;

        let mut wake_addr = local_addr;
        if wake_addr.ip().is_unspecified() {
            wake_addr.set_ip(match wake_addr {
                SocketAddr::V4(_) => std::net::Ipv4Addr::LOCALHOST.into(),
                SocketAddr::V6(_) => std::net::Ipv6Addr::LOCALHOST.into(),
            });
        }

        tracing::info!("Listening on {} (thread per connection)", local_addr);
        Ok(Self {
            listener,
            local_addr,
            handlers: Arc::new(handlers),
            config,
            stop: StopHandle::for_listener(wake_addr),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Accept until stopped, then wait for every worker to finish
    pub fn run(self) -> Result<()> {
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        for incoming in self.listener.incoming() {
            if self.stop.is_stopped() {
                break;
            }

            let stream = match incoming {
                Ok(stream) => stream,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    continue;
                }
            };

            let (finished, running): (Vec<_>, Vec<_>) =
                workers.into_iter().partition(|worker| worker.is_finished());
            workers = running;
            finished.into_iter().for_each(join_worker);

            let worker = match Worker::new(
                stream,
                Arc::clone(&self.handlers),
                &self.config,
                self.stop.clone(),
            ) {
                Ok(worker) => worker,
                Err(e) => {
                    tracing::warn!("Could not set up connection: {}", e);
                    continue;
                }
            };
            let name = format!("eventkv-conn-{}", worker.peer_addr);
            workers.push(thread::Builder::new().name(name).spawn(move || worker.serve())?);
        }

        tracing::info!("Waiting for {} workers", workers.len());
        workers.into_iter().for_each(join_worker);
        tracing::info!("Server on {} stopped", self.local_addr);
        Ok(())
    }
}

/// Join a connection thread, reporting a panic instead of dropping it
fn join_worker(worker: JoinHandle<()>) {
    let name = worker.thread().name().unwrap_or("worker").to_string();
    if worker.join().is_err() {
        tracing::warn!("Connection thread {} panicked", name);
    }
}

/// Serves one blocking connection
struct Worker {
    reader: FrameReader<TcpStream>,
    writer: TcpStream,
    handlers: Arc<HandlerRegistry>,
    stop: StopHandle,
    peer_addr: String,
}

impl Worker {
    fn new(
        stream: TcpStream,
        handlers: Arc<HandlerRegistry>,
        config: &Config,
        stop: StopHandle,
    ) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(config.client_read_timeout()))?;

        let writer = stream.try_clone()?;
        Ok(Self {
            reader: FrameReader::new(stream, config.read_chunk_size),
            writer,
            handlers,
            stop,
            peer_addr,
        })
    }

    fn serve(mut self) {
        tracing::debug!("Connection established from {}", self.peer_addr);

        match self.handle() {
            Ok(()) => tracing::debug!("Client {} disconnected", self.peer_addr),
            Err(e) => tracing::warn!("Dropping {}: {}", self.peer_addr, e),
        }
    }

    fn handle(&mut self) -> Result<()> {
        while !self.stop.is_stopped() {
            let message = match self.reader.read_frame() {
                Ok(Some(message)) => message,
                Ok(None) => return Ok(()),
                Err(KvError::Io(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    continue;
                }
                Err(KvError::Io(ref e))
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
                    ) =>
                {
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let kind = message.kind();
            tracing::debug!("Received {:?} from {}", kind, self.peer_addr);

            match self.handlers.dispatch(message) {
                Ok(response) => {
                    self.writer.write_all(&response)?;
                    self.writer.flush()?;
                }
                Err(e) => {
                    tracing::warn!("Handler for {:?} from {} failed: {}", kind, self.peer_addr, e)
                }
            }
        }
        Ok(())
    }
}
