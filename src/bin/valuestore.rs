//! valuestore CLI
//!
//! Inspect and edit a value store from the command line.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use valuestore::{DataStore, StoreConfig};

/// valuestore inspection tool
#[derive(Parser, Debug)]
#[command(name = "valuestore")]
#[command(about = "Inspect a content-addressable value store")]
#[command(version)]
struct Args {
    /// Directory holding the store files
    #[arg(short, long, default_value = "./valuestore_data")]
    data_dir: PathBuf,

    /// Store name (file prefix)
    #[arg(short, long, default_value = "values")]
    name: String,

    /// fsync every write
    #[arg(long)]
    force_sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a value and print its id
    Put {
        /// The value to store
        value: String,
    },

    /// Print the value stored under an id
    Get {
        /// The id to resolve
        id: u32,
    },

    /// Print the id of a value
    Lookup {
        /// The value to look up
        value: String,
    },

    /// Print store counters
    Stats,

    /// Check every id against the hash index
    Verify,

    /// Print every id and value
    Dump,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,valuestore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = StoreConfig::builder()
        .data_dir(&args.data_dir)
        .name(&args.name)
        .force_sync(args.force_sync)
        .build();

    let store = match DataStore::open(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&store, args.command) {
        tracing::error!("Command failed: {}", e);
        process::exit(1);
    }

    if let Err(e) = store.close() {
        tracing::error!("Failed to close store: {}", e);
        process::exit(1);
    }
}

fn run(store: &DataStore, command: Commands) -> valuestore::Result<()> {
    match command {
        Commands::Put { value } => {
            let id = store.store_data(value.as_bytes())?;
            println!("{}", id);
        }
        Commands::Get { id } => match store.get_data(id)? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(absent)"),
        },
        Commands::Lookup { value } => match store.get_id(value.as_bytes())? {
            Some(id) => println!("{}", id),
            None => println!("(absent)"),
        },
        Commands::Stats => {
            let stats = store.stats();
            println!("values:         {}", stats.values);
            println!("data file size: {}", stats.data_file_size);
            println!("hash buckets:   {}", stats.hash_buckets);
            println!("hash items:     {}", stats.hash_items);
        }
        Commands::Verify => {
            store.verify()?;
            println!("ok ({} values)", store.max_id());
        }
        Commands::Dump => {
            for entry in store.iter() {
                let (id, value) = entry?;
                println!("{}\t{}", id, String::from_utf8_lossy(&value));
            }
        }
    }
    Ok(())
}
