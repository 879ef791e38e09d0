//! rastore CLI
//!
//! Command-line access to a rastore data directory.

use std::process;

use clap::{Parser, Subcommand};
use rastore::{Config, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// rastore CLI
#[derive(Parser, Debug)]
#[command(name = "rastore-cli")]
#[command(about = "CLI for the rastore random-access record store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./rastore_data")]
    data_dir: String,

    /// Disable the record cache
    #[arg(long)]
    no_cache: bool,

    /// Trailing free blocks that trigger truncation
    #[arg(long, default_value = "10")]
    truncate_boundary: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a value and print its record id
    Put {
        /// The value to store
        value: String,
    },

    /// Print the value of a record
    Get {
        /// The record id
        id: u64,
    },

    /// Overwrite a record
    Set {
        /// The record id
        id: u64,

        /// The new value
        value: String,

        /// Create the record if the id is free
        #[arg(short, long)]
        force: bool,
    },

    /// Delete a record
    Del {
        /// The record id
        id: u64,
    },

    /// Print block and cache counters
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rastore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .cache_enabled(!args.no_cache)
        .truncate_boundary(args.truncate_boundary)
        .build();

    let store = match Store::open(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to open storage: {}", e);
            process::exit(1);
        }
    };

    let outcome = run(&store, args.command);
    let closed = store.close().wait();

    if let Err(e) = outcome.and(closed) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(store: &Store, command: Commands) -> rastore::Result<()> {
    match command {
        Commands::Put { value } => {
            let id = store.put(value.into_bytes()).wait()?;
            println!("{}", id);
        }
        Commands::Get { id } => match store.get(id).wait()? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => {
                println!("(not found)");
            }
        },
        Commands::Set { id, value, force } => {
            store.set_with(id, value.into_bytes(), force).wait()?;
            println!("OK");
        }
        Commands::Del { id } => {
            store.del(id).wait()?;
            println!("OK");
        }
        Commands::Stats => {
            let stats = store.stats().wait()?;
            println!("total_blocks:   {}", stats.total_blocks);
            println!("free_blocks:    {}", stats.free_blocks);
            println!("cached_entries: {}", stats.cached_entries);
            println!("cached_bytes:   {}", stats.cached_bytes);
            println!("data_file_len:  {}", stats.data_file_len);
        }
    }
    Ok(())
}
