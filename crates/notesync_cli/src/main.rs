//! notesync CLI
//!
//! Command-line tools for inspecting a device's sync state and exercising
//! the sync engine.
//!
//! # Commands
//!
//! - `device-id` - Print (creating if needed) the device identity
//! - `inspect` - Display the stored identity and checkpoint
//! - `reset-checkpoint` - Forget the checkpoint so the next pull starts over
//! - `simulate` - Run a multi-device sync simulation in process

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// notesync command-line tools.
#[derive(Parser)]
#[command(name = "notesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory of the device's secure store
    #[arg(global = true, short, long)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the device identity, creating one if none is stored
    DeviceId,

    /// Display the stored identity and checkpoint
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Forget the pull checkpoint
    ResetCheckpoint,

    /// Run a multi-device sync simulation against an in-process server
    Simulate {
        /// Number of devices
        #[arg(short, long, default_value = "3")]
        devices: usize,

        /// Number of script steps
        #[arg(short, long, default_value = "50")]
        edits: usize,

        /// Network failures injected into device 0's first pushes
        #[arg(long, default_value = "0")]
        fail_pushes: usize,

        /// Random seed (random if omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::DeviceId => {
            let store = cli.store.ok_or("Store path required for device-id")?;
            runtime.block_on(commands::device::run(&store))?;
        }
        Commands::Inspect { format } => {
            let store = cli.store.ok_or("Store path required for inspect")?;
            runtime.block_on(commands::inspect::run(&store, &format))?;
        }
        Commands::ResetCheckpoint => {
            let store = cli.store.ok_or("Store path required for reset-checkpoint")?;
            runtime.block_on(commands::reset::run(&store))?;
        }
        Commands::Simulate {
            devices,
            edits,
            fail_pushes,
            seed,
            format,
        } => {
            let options = commands::simulate::SimulateOptions {
                devices,
                edits,
                fail_pushes,
                seed,
            };
            runtime.block_on(commands::simulate::run(options, &format))?;
        }
        Commands::Version => {
            println!("notesync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
