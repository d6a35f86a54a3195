//! Device inventory for cbtrack.
//!
//! This module holds the in-memory cache of device checkout statuses. The
//! cache is backed by a local JSON status file, mutated optimistically on
//! each completed checkout, and periodically reconciled against the remote
//! sheet.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Checkout status of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    /// The device is on the shelf.
    In,
    /// The device is checked out.
    Out,
}

impl DeviceStatus {
    /// The opposite status.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::In => Self::Out,
            Self::Out => Self::In,
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In => write!(f, "IN"),
            Self::Out => write!(f, "OUT"),
        }
    }
}

impl std::str::FromStr for DeviceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            other => Err(Error::internal(format!("unknown device status: {other}"))),
        }
    }
}

/// In-memory cache of device checkout statuses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    devices: HashMap<String, DeviceStatus>,
}

impl Inventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the inventory from a JSON status file.
    ///
    /// A missing file yields an empty inventory (fresh install; the first
    /// remote refresh fills it). A malformed file is a hard error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No status file at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let devices: HashMap<String, DeviceStatus> =
            serde_json::from_str(&raw).map_err(|source| Error::FileParse {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("Loaded {} device statuses", devices.len());
        Ok(Self { devices })
    }

    /// Save the inventory to a JSON status file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = serde_json::to_string_pretty(&self.devices)?;
        std::fs::write(path, raw).map_err(|source| Error::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the status of a device.
    #[must_use]
    pub fn status(&self, device: &str) -> Option<DeviceStatus> {
        self.devices.get(device).copied()
    }

    /// Check if a device is known.
    #[must_use]
    pub fn contains(&self, device: &str) -> bool {
        self.devices.contains_key(device)
    }

    /// Insert or overwrite a device status.
    pub fn set(&mut self, device: impl Into<String>, status: DeviceStatus) {
        self.devices.insert(device.into(), status);
    }

    /// Flip a device's status between IN and OUT, returning the new status.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is not in the inventory.
    pub fn flip(&mut self, device: &str) -> Result<DeviceStatus> {
        let status = self
            .devices
            .get_mut(device)
            .ok_or_else(|| Error::unknown_device(device))?;
        *status = status.flipped();
        Ok(*status)
    }

    /// Adopt remote statuses, keeping local state for devices with queued
    /// entries.
    ///
    /// Remote is the source of truth except where a local flip has not been
    /// flushed yet; overwriting those would lose the pending transition.
    /// Devices no longer present remotely are dropped unless pending.
    pub fn reconcile(
        &mut self,
        remote: HashMap<String, DeviceStatus>,
        pending: &HashSet<String>,
    ) {
        let mut next = HashMap::with_capacity(remote.len());

        for (device, status) in remote {
            if pending.contains(&device) {
                // Keep the optimistic local value until the flush lands
                let local = self.devices.get(&device).copied().unwrap_or(status);
                next.insert(device, local);
            } else {
                next.insert(device, status);
            }
        }

        for device in pending {
            if let Some(status) = self.devices.get(device) {
                next.entry(device.clone()).or_insert(*status);
            }
        }

        let dropped = self
            .devices
            .keys()
            .filter(|d| !next.contains_key(*d))
            .count();
        if dropped > 0 {
            warn!("Refresh dropped {dropped} devices no longer present remotely");
        }

        self.devices = next;
    }

    /// Number of known devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if the inventory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Snapshot of all device statuses.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, DeviceStatus> {
        self.devices.clone()
    }

    /// Iterate over devices sorted by id (for stable display output).
    #[must_use]
    pub fn sorted(&self) -> Vec<(String, DeviceStatus)> {
        let mut devices: Vec<_> = self
            .devices
            .iter()
            .map(|(id, status)| (id.clone(), *status))
            .collect();
        devices.sort_by(|a, b| a.0.cmp(&b.0));
        devices
    }
}
