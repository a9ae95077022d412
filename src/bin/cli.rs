//! kival CLI
//!
//! Command-line tool for inspecting and editing a local kival store.

use std::process;

use clap::{Parser, Subcommand};
use kival::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// kival CLI
#[derive(Parser, Debug)]
#[command(name = "kival-cli")]
#[command(about = "Administer a kival key-value store directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./kival_data")]
    data_dir: String,

    /// Maximum segment size in bytes before rotation
    #[arg(short = 's', long, default_value = "16777216")]
    max_segment_size: u64,

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

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Merge all segments, dropping dead records
    Compact,

    /// Print store statistics
    Stats,

    /// List live keys
    Keys,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kival=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .max_segment_size(args.max_segment_size)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&engine, args.command) {
        tracing::error!("{}", e);
        process::exit(if e.is_not_found() { 2 } else { 1 });
    }

    if let Err(e) = engine.close() {
        tracing::error!("Failed to close store: {}", e);
        process::exit(1);
    }
}

fn run(engine: &Engine, command: Commands) -> kival::Result<()> {
    match command {
        Commands::Get { key } => {
            let value = engine.get(key.as_bytes())?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Commands::Put { key, value } => {
            engine.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            engine.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Compact => {
            let stats = engine.compact()?;
            println!(
                "retired {} segments, kept {} keys, {} -> {} bytes ({} reclaimed)",
                stats.segments_retired,
                stats.live_keys,
                stats.bytes_before,
                stats.bytes_after,
                stats.bytes_reclaimed
            );
        }
        Commands::Stats => {
            let stats = engine.stats();
            println!("live keys:      {}", stats.live_keys);
            println!("segments:       {}", stats.segment_count);
            println!("active segment: {}", stats.active_segment_id);
            println!("total bytes:    {}", stats.total_bytes);
        }
        Commands::Keys => {
            let mut keys = engine.keys();
            keys.sort();
            for key in keys {
                println!("{}", String::from_utf8_lossy(&key));
            }
        }
    }
    Ok(())
}
