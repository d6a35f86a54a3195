//! Scan-order enforcement for cbtrack.
//!
//! A checkout is a pair of scans: the device first, then the student ID.
//! [`CheckoutFlow`] is the small state machine that enforces that order,
//! computes the status flip for the device scan, and emits a [`LogEntry`]
//! once the pair completes. Anything out of order or unrecognized rejects
//! the scan and restarts the cycle.

use tracing::debug;

use crate::inventory::{DeviceStatus, Inventory};
use crate::ledger::LogEntry;
use crate::roster::Roster;

/// What kind of payload a scan resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// A device id from the inventory.
    Device,
    /// A student payload from the roster.
    Student,
}

impl ScanKind {
    /// Operator prompt for the expected scan.
    #[must_use]
    pub fn prompt(self) -> &'static str {
        match self {
            Self::Device => "Show device",
            Self::Student => "Show ID",
        }
    }
}

impl std::fmt::Display for ScanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Student => write!(f, "student"),
        }
    }
}

/// Result of feeding one payload through the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A device was scanned while a device was expected. `action` is the
    /// status the device will flip to when the cycle completes.
    DeviceAccepted {
        /// The scanned device id.
        device: String,
        /// The status the device flips to.
        action: DeviceStatus,
    },

    /// A student was scanned while a student was expected; the cycle is
    /// complete and produced a ledger entry.
    Completed(LogEntry),

    /// A recognized payload of the wrong kind; the cycle restarts.
    OutOfOrder {
        /// The kind that was expected.
        expected: ScanKind,
        /// The kind that was scanned.
        scanned: ScanKind,
    },

    /// The payload matched neither the roster nor the inventory; the cycle
    /// restarts.
    Unrecognized {
        /// The offending payload.
        payload: String,
    },
}

/// The device scan held while waiting for the matching student scan.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingDevice {
    device: String,
    action: DeviceStatus,
}

/// State machine enforcing device-then-student scan ordering.
#[derive(Debug, Default)]
pub struct CheckoutFlow {
    pending: Option<PendingDevice>,
}

impl CheckoutFlow {
    /// Create a new flow, expecting a device scan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The kind of scan the flow currently expects.
    #[must_use]
    pub fn expecting(&self) -> ScanKind {
        if self.pending.is_some() {
            ScanKind::Student
        } else {
            ScanKind::Device
        }
    }

    /// Restart the cycle, discarding any pending device scan.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Feed one decoded payload through the flow.
    ///
    /// The roster is consulted before the inventory, matching how payloads
    /// are generated: student payloads are digests that cannot collide with
    /// readable device ids.
    pub fn apply(
        &mut self,
        payload: &str,
        roster: &Roster,
        inventory: &Inventory,
    ) -> ScanOutcome {
        let expected = self.expecting();

        if let Some(student) = roster.identify(payload) {
            return self.apply_student(expected, student.to_string());
        }

        if let Some(status) = inventory.status(payload) {
            return self.apply_device(expected, payload.to_string(), status);
        }

        debug!("Payload matched neither roster nor inventory");
        self.reset();
        ScanOutcome::Unrecognized {
            payload: payload.to_string(),
        }
    }

    fn apply_device(
        &mut self,
        expected: ScanKind,
        device: String,
        current: DeviceStatus,
    ) -> ScanOutcome {
        if expected != ScanKind::Device {
            self.reset();
            return ScanOutcome::OutOfOrder {
                expected,
                scanned: ScanKind::Device,
            };
        }

        let action = current.flipped();
        self.pending = Some(PendingDevice {
            device: device.clone(),
            action,
        });
        ScanOutcome::DeviceAccepted { device, action }
    }

    fn apply_student(&mut self, expected: ScanKind, student: String) -> ScanOutcome {
        if expected != ScanKind::Student {
            self.reset();
            return ScanOutcome::OutOfOrder {
                expected,
                scanned: ScanKind::Student,
            };
        }

        // expecting() returned Student, so a pending device must exist
        let Some(pending) = self.pending.take() else {
            self.reset();
            return ScanOutcome::OutOfOrder {
                expected: ScanKind::Device,
                scanned: ScanKind::Student,
            };
        };

        ScanOutcome::Completed(LogEntry::new(pending.device, pending.action, student))
    }
}
