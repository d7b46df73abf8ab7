//! objsync CLI
//!
//! Command-line tools for inspecting and editing a client's sync scopes.
//!
//! # Commands
//!
//! - `list` - Show every bucket's scope
//! - `show` - Show one bucket's scope
//! - `set` - Set a bucket's scope query
//! - `reset` - Forget a bucket's last sync time
//! - `remove` - Remove a bucket's scope
//! - `purge` - Remove every scope

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// objsync command-line tools.
#[derive(Parser)]
#[command(name = "objsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the scope registry file
    #[arg(global = true, short, long)]
    registry: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every bucket's scope
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show one bucket's scope
    Show {
        /// Bucket name
        bucket: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Set a bucket's scope; the next sync pulls from scratch
    Set {
        /// Bucket name
        bucket: String,

        /// Scope query as JSON, e.g. '{"type":"eq","field":"done","value":false}'.
        /// Omit to sync the whole bucket.
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Forget a bucket's last sync time, keeping its query
    Reset {
        /// Bucket name
        bucket: String,
    },

    /// Remove a bucket's scope
    Remove {
        /// Bucket name
        bucket: String,
    },

    /// Remove every scope
    Purge {
        /// Dry run - show what would be removed
        #[arg(short, long)]
        dry_run: bool,
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

    if let Commands::Version = cli.command {
        println!("objsync CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("objsync engine v{}", objsync_engine::VERSION);
        return Ok(());
    }

    let path = cli.registry.ok_or("Registry path required (--registry)")?;
    match cli.command {
        Commands::List { format } => commands::scopes::list(&path, &format)?,
        Commands::Show { bucket, format } => commands::scopes::show(&path, &bucket, &format)?,
        Commands::Set { bucket, query } => {
            commands::scopes::set(&path, &bucket, query.as_deref())?;
        }
        Commands::Reset { bucket } => commands::scopes::reset(&path, &bucket)?,
        Commands::Remove { bucket } => commands::scopes::remove(&path, &bucket)?,
        Commands::Purge { dry_run } => commands::scopes::purge(&path, dry_run)?,
        Commands::Version => {}
    }

    Ok(())
}
