//! Configuration for EventKV
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

/// Main configuration for an EventKV server or client
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Soft cap on concurrent clients.
    /// Only sizes the reactor's event buffer; connections beyond it are still accepted.
    pub max_clients: usize,

    // -------------------------------------------------------------------------
    // Event Loop Configuration
    // -------------------------------------------------------------------------
    /// Bytes requested per non-blocking read
    pub read_chunk_size: usize,

    /// Upper bound on a single reactor poll (milliseconds).
    /// `None` blocks until an event or a wake-up arrives.
    pub poll_timeout_ms: Option<u64>,

    /// Queued response bytes at which a connection stops reading requests
    /// until its peer catches up
    pub max_pending_write_bytes: usize,

    // -------------------------------------------------------------------------
    // Blocking Reader Configuration
    // -------------------------------------------------------------------------
    /// Read timeout used by blocking readers (milliseconds)
    pub client_read_timeout_ms: u64,

    /// Consecutive read timeouts a blocking reader tolerates before giving up
    pub max_idle_timeouts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7878".to_string(),
            max_clients: 10_000,
            read_chunk_size: 1024,
            poll_timeout_ms: Some(100),
            max_pending_write_bytes: crate::network::DEFAULT_MAX_PENDING_WRITE,
            client_read_timeout_ms: 20,
            max_idle_timeouts: 10,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Poll timeout as a `Duration`
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_ms.map(Duration::from_millis)
    }

    /// Blocking read timeout as a `Duration`
    pub fn client_read_timeout(&self) -> Duration {
        Duration::from_millis(self.client_read_timeout_ms)
    }

    /// Reject values the event loop cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_clients == 0 {
            return Err(crate::KvError::Config(
                "max_clients must be at least 1".to_string(),
            ));
        }
        if self.read_chunk_size == 0 {
            return Err(crate::KvError::Config(
                "read_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.max_pending_write_bytes == 0 {
            return Err(crate::KvError::Config(
                "max_pending_write_bytes must be at least 1".to_string(),
            ));
        }
        if self.client_read_timeout_ms == 0 {
            return Err(crate::KvError::Config(
                "client_read_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the soft cap on concurrent clients
    pub fn max_clients(mut self, count: usize) -> Self {
        self.config.max_clients = count;
        self
    }

    /// Set the per-read chunk size (in bytes)
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size;
        self
    }

    /// Set the poll timeout (in milliseconds, `None` for unbounded)
    pub fn poll_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.config.poll_timeout_ms = ms;
        self
    }

    /// Set the write-queue size that pauses reading (in bytes)
    pub fn max_pending_write_bytes(mut self, bytes: usize) -> Self {
        self.config.max_pending_write_bytes = bytes;
        self
    }

    /// Set the blocking read timeout (in milliseconds)
    pub fn client_read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.client_read_timeout_ms = ms;
        self
    }

    /// Set how many consecutive read timeouts are tolerated
    pub fn max_idle_timeouts(mut self, count: u32) -> Self {
        self.config.max_idle_timeouts = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
