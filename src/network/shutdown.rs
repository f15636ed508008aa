//! Stop signalling shared by both server variants

use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::reactor::WakeHandle;

/// How a blocked server thread is kicked after the flag is set
#[derive(Clone)]
enum Wake {
    /// Fire the reactor's wake-up descriptor
    Reactor(WakeHandle),
    /// Connect to our own listener so a blocking `accept` returns
    SelfConnect(SocketAddr),
}

/// Cloneable, thread-safe request to stop a server
#[derive(Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    wake: Wake,
}

impl StopHandle {
    pub(crate) fn for_reactor(wake: WakeHandle) -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            wake: Wake::Reactor(wake),
        }
    }

    pub(crate) fn for_listener(addr: SocketAddr) -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            wake: Wake::SelfConnect(addr),
        }
    }

    /// Ask the server to stop and interrupt its wait.
    /// Takes effect at the server's next loop boundary.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Stop requested");

        match &self.wake {
            Wake::Reactor(handle) => {
                if let Err(e) = handle.wake() {
                    tracing::warn!("Could not wake event loop: {}", e);
                }
            }
            Wake::SelfConnect(addr) => {
                if let Err(e) = TcpStream::connect_timeout(addr, Duration::from_millis(500)) {
                    tracing::debug!("Wake-up connect to {} failed: {}", addr, e);
                }
            }
        }
    }

    /// Set the flag without waking anyone (the caller is the server thread)
    pub(crate) fn request_stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
