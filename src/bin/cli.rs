//! EventKV CLI Client
//!
//! Command-line interface for interacting with EventKV.

use clap::{Parser, Subcommand};
use eventkv::protocol::Status;
use eventkv::{Client, Config};

/// EventKV CLI
#[derive(Parser, Debug)]
#[command(name = "eventkv-cli")]
#[command(about = "CLI for the EventKV key-value server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    server: String,

    /// Read timeout in milliseconds
    #[arg(long, default_value = "20")]
    timeout_ms: u64,

    /// Consecutive read timeouts tolerated before giving up
    #[arg(long, default_value = "10")]
    max_timeouts: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },
}

fn main() {
    let args = Args::parse();

    let config = Config::builder()
        .client_read_timeout_ms(args.timeout_ms)
        .max_idle_timeouts(args.max_timeouts)
        .build();

    if let Err(e) = run(&args, &config) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args, config: &Config) -> eventkv::Result<()> {
    let mut client = Client::connect_with(args.server.as_str(), config)?;

    match &args.command {
        Commands::Get { key } => match client.get(key)? {
            Some(value) => println!("{}", value),
            None => {
                eprintln!("(not found)");
                std::process::exit(2);
            }
        },
        Commands::Put { key, value } => match client.put_or_update(key, value)? {
            Status::Ok => println!("OK"),
            status => {
                eprintln!("server answered {:?}", status);
                std::process::exit(2);
            }
        },
    }
    Ok(())
}
