//! Checkout ledger for cbtrack.
//!
//! A [`LogEntry`] is one completed checkout or return: which device, which
//! student, which way the status flipped, and when. Entries accumulate in a
//! [`Ledger`] queue persisted to a local JSON file so nothing is lost if the
//! kiosk dies before the next flush.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::inventory::DeviceStatus;

/// One completed checkout/return transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Device id.
    pub device: String,
    /// The status the device flipped to (`OUT` for a checkout, `IN` for a
    /// return).
    pub action: DeviceStatus,
    /// Student identity from the roster.
    pub student: String,
    /// Transaction date as `day/month/year`.
    pub date: String,
    /// Transaction time as `HH:MM:SS`.
    pub time: String,
}

impl LogEntry {
    /// Create an entry stamped with the current local time.
    #[must_use]
    pub fn new(
        device: impl Into<String>,
        action: DeviceStatus,
        student: impl Into<String>,
    ) -> Self {
        Self::with_timestamp(device, action, student, Local::now())
    }

    /// Create an entry with an explicit timestamp.
    #[must_use]
    pub fn with_timestamp(
        device: impl Into<String>,
        action: DeviceStatus,
        student: impl Into<String>,
        at: DateTime<Local>,
    ) -> Self {
        Self {
            device: device.into(),
            action,
            student: student.into(),
            date: format!("{}/{}/{}", at.day(), at.month(), at.year()),
            time: format!("{:02}:{:02}:{:02}", at.hour(), at.minute(), at.second()),
        }
    }
}

/// Persistent queue of entries awaiting flush to the remote sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: Vec<LogEntry>,
}

impl Ledger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the ledger from a JSON batch file.
    ///
    /// Missing, empty, or malformed files yield an empty ledger with a
    /// warning; a broken queue file must not keep the kiosk from starting.
    #[must_use]
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not read batch file {}: {err}", path.display());
                }
                return Self::new();
            }
        };

        match serde_json::from_str::<Vec<LogEntry>>(&raw) {
            Ok(entries) => {
                debug!("Loaded {} queued entries", entries.len());
                Self { entries }
            }
            Err(err) => {
                warn!("Batch file {} invalid or empty: {err}", path.display());
                Self::new()
            }
        }
    }

    /// Save the ledger to a JSON batch file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, raw).map_err(|source| Error::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Append an entry to the queue.
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Snapshot of the queued entries, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.clone()
    }

    /// Remove the first `count` entries after a successful flush.
    ///
    /// Entries pushed while the flush was in flight stay queued.
    pub fn acknowledge(&mut self, count: usize) {
        let count = count.min(self.entries.len());
        self.entries.drain(..count);
    }

    /// Devices that still have queued, unflushed entries.
    #[must_use]
    pub fn pending_devices(&self) -> HashSet<String> {
        self.entries.iter().map(|e| e.device.clone()).collect()
    }

    /// The queued entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
