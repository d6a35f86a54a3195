//! `cbtrack` - A device-checkout kiosk backed by a shared spreadsheet
//!
//! This library provides the core functionality for a school checkout
//! kiosk: validating scanned QR payloads against a student roster and a
//! device inventory, enforcing device-then-student scan ordering, flipping
//! checkout statuses, and batching audit entries to a remote spreadsheet
//! with backoff on rate limits.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod flow;
pub mod flush;
pub mod inventory;
pub mod kiosk;
pub mod ledger;
pub mod logging;
pub mod roster;
pub mod scan;
pub mod sheets;

pub use config::Config;
pub use error::{Error, Result};
pub use flow::{CheckoutFlow, ScanKind, ScanOutcome};
pub use inventory::{DeviceStatus, Inventory};
pub use kiosk::Kiosk;
pub use ledger::{Ledger, LogEntry};
pub use logging::init_logging;
pub use roster::Roster;
pub use scan::{RawScan, ScanSource, StdinSource};
