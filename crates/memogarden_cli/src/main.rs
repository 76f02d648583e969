//! MemoGarden CLI
//!
//! Operator tools for the Soil and Core stores.
//!
//! # Commands
//!
//! - `init` - Create both stores and their schemas
//! - `check` - Run the consistency check
//! - `status` - Show the operating mode after the startup check
//! - `history` - Show an entity's versions and verify its hash chain

mod commands;

use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// MemoGarden store maintenance tools.
#[derive(Parser)]
#[command(name = "memogarden")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the Soil (facts) database [env: MEMOGARDEN_SOIL_DB]
    #[arg(global = true, long)]
    soil: Option<PathBuf>,

    /// Path to the Core (entities) database [env: MEMOGARDEN_CORE_DB]
    #[arg(global = true, long)]
    core: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create both stores and their schemas
    Init,

    /// Scan both stores for orphaned facts and broken hash chains
    Check {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the operating mode
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show an entity's versions and verify its hash chain
    History {
        /// Entity UUID, with or without the `core_` prefix
        uuid: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (soil, core) = (cli.soil, cli.core);
    dispatch(cli.command, move || commands::StorePaths::resolve(soil, core))
}

/// Runs a command, resolving store paths only for commands that open stores.
fn dispatch<R>(command: Commands, stores: R) -> Result<(), Box<dyn Error>>
where
    R: FnOnce() -> Result<commands::StorePaths, Box<dyn Error>>,
{
    match command {
        Commands::Init => commands::init::run(&stores()?)?,
        Commands::Check { format } => commands::check::run(&stores()?, format.parse()?)?,
        Commands::Status { format } => commands::status::run(&stores()?, format.parse()?)?,
        Commands::History { uuid, format } => {
            commands::history::run(&stores()?, &uuid, format.parse()?)?;
        }
        Commands::Version => {
            println!("MemoGarden CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("MemoGarden Core v{}", memogarden_core::VERSION);
        }
    }

    Ok(())
}
