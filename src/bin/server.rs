//! EventKV Server Binary
//!
//! Starts the TCP server for EventKV.

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use eventkv::{Config, InMemoryStore, Server, StopHandle, ThreadedServer};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing_subscriber::{fmt, EnvFilter};

/// Concurrency model used to serve clients
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// One thread, non-blocking sockets, readiness notification
    EventLoop,
    /// One blocking thread per connection
    Threaded,
}

/// EventKV Server
#[derive(Parser, Debug)]
#[command(name = "eventkv-server")]
#[command(about = "In-memory key-value server over a framed TCP protocol")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    listen: String,

    /// Expected concurrent clients (sizes the event buffer, not a hard limit)
    #[arg(short, long, default_value = "10000")]
    max_clients: usize,

    /// Concurrency model
    #[arg(long, value_enum, default_value = "event-loop")]
    mode: Mode,

    /// Longest single wait for readiness, in milliseconds (0 = unbounded)
    #[arg(long, default_value = "100")]
    poll_timeout_ms: u64,

    /// Bytes requested per socket read
    #[arg(long, default_value = "1024")]
    read_chunk_size: usize,

    /// Unsent response bytes per client before its requests stop being read
    #[arg(long, default_value = "1048576")]
    max_pending_write_bytes: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,eventkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("EventKV Server v{}", eventkv::VERSION);
    tracing::info!("Listen address: {}", args.listen);
    tracing::info!("Mode: {:?}", args.mode);

    // Build config from args
    let config = Config::builder()
        .listen_addr(&args.listen)
        .max_clients(args.max_clients)
        .poll_timeout_ms((args.poll_timeout_ms > 0).then_some(args.poll_timeout_ms))
        .read_chunk_size(args.read_chunk_size)
        .max_pending_write_bytes(args.max_pending_write_bytes)
        .build();

    let store = Arc::new(InMemoryStore::new());

    let result = match args.mode {
        Mode::EventLoop => Server::bind(config, store).and_then(|server| {
            install_signal_handler(server.stop_handle());
            server.run()
        }),
        Mode::Threaded => ThreadedServer::bind(config, store).and_then(|server| {
            install_signal_handler(server.stop_handle());
            server.run()
        }),
    };

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

/// Stop the server on SIGINT / SIGTERM
fn install_signal_handler(stop: StopHandle) {
    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            tracing::warn!("Signal handlers unavailable, stop with kill -9: {}", e);
            return;
        }
    };

    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            tracing::info!("Received signal {}, initiating shutdown...", signal);
            stop.stop();
        }
    });
}
