//! Command-line interface for cbtrack.
//!
//! This module provides the CLI structure and command definitions for the
//! `cbk` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, DevicesCommand, RosterCommand, StatusCommand};

/// cbk - Device checkout kiosk
///
/// Scans device and student QR codes, flips checkout statuses, and keeps a
/// shared spreadsheet up to date with an audit log of every transaction.
#[derive(Debug, Parser)]
#[command(name = "cbk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the kiosk scan loop
    Run,

    /// Show kiosk and queue status
    Status(StatusCommand),

    /// Flush queued entries to the remote sheet now
    Flush,

    /// List device checkout statuses
    Devices(DevicesCommand),

    /// Manage the student roster
    #[command(subcommand)]
    Roster(RosterCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
