//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Devices command arguments.
#[derive(Debug, Args)]
pub struct DevicesCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Pull statuses from the remote sheet instead of the local cache
    #[arg(short, long)]
    pub remote: bool,
}

/// Roster management commands.
#[derive(Debug, Subcommand)]
pub enum RosterCommand {
    /// Build a roster from a names file
    Build {
        /// File with one name per line (`Last, First`); lines starting
        /// with '#' are class markers and are skipped
        #[arg(short, long)]
        names: PathBuf,

        /// Fuzz word joined into each name before hashing
        #[arg(short, long)]
        fuzz: String,

        /// Output path (defaults to the configured roster path)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Merge several roster files into one
    Join {
        /// Roster files to merge, later files win on collisions
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output path (defaults to the configured roster path)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show the loaded roster
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
