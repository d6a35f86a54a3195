//! Scan intake for cbtrack.
//!
//! This module defines the decoded-payload type and the source seam through
//! which scans enter the kiosk. Camera handling and QR decoding live behind
//! the [`ScanSource`] trait; the stock implementation reads payloads from
//! standard input, which is how keyboard-wedge QR scanners present.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// A single decoded QR payload.
#[derive(Debug, Clone)]
pub struct RawScan {
    payload: String,
    received_at: Instant,
}

impl RawScan {
    /// Create a new scan from a decoded payload.
    ///
    /// Leading and trailing whitespace is trimmed.
    #[must_use]
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into().trim().to_string(),
            received_at: Instant::now(),
        }
    }

    /// The decoded payload string.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// When this scan arrived.
    #[must_use]
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Check if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Trait for scan sources.
///
/// Implementors provide the actual mechanism for producing decoded QR
/// payloads (keyboard-wedge scanner, camera pipeline, replay file) and push
/// them through the provided channel.
pub trait ScanSource: Send + Sync {
    /// The name of this scan source (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Start the scan source.
    ///
    /// This should begin producing scans and sending them through the
    /// provided channel until stopped or exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails to start, such as when it is
    /// already running.
    fn start(&mut self, sender: tokio::sync::mpsc::Sender<RawScan>) -> Result<()>;

    /// Stop the scan source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails to stop cleanly.
    fn stop(&mut self) -> Result<()>;

    /// Check if the scan source is currently running.
    fn is_running(&self) -> bool;
}

/// Scan source reading newline-terminated payloads from standard input.
///
/// Keyboard-wedge QR scanners type the decoded payload followed by Enter,
/// so a line of stdin is exactly one scan. Blank lines are dropped.
#[derive(Debug, Default)]
pub struct StdinSource {
    running: Arc<AtomicBool>,
}

impl StdinSource {
    /// Name reported by this source.
    pub const NAME: &'static str = "stdin";

    /// Create a new stdin scan source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScanSource for StdinSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn start(&mut self, sender: tokio::sync::mpsc::Sender<RawScan>) -> Result<()> {
        if self.is_running() {
            return Err(Error::scan_source_start(Self::NAME, "already running"));
        }
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let spawned = std::thread::Builder::new()
            .name("cbtrack-stdin".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    match line {
                        Ok(line) => {
                            let scan = RawScan::new(line);
                            if scan.is_empty() {
                                continue;
                            }
                            debug!("Read payload from stdin");
                            if sender.blocking_send(scan).is_err() {
                                // Receiver gone, kiosk is shutting down
                                break;
                            }
                        }
                        Err(err) => {
                            warn!("Failed to read from stdin: {err}");
                            break;
                        }
                    }
                }
                running.store(false, Ordering::SeqCst);
                info!("Stdin scan source finished");
            });

        if let Err(err) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(Error::scan_source_start(Self::NAME, err.to_string()));
        }

        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(Error::scan_source_stop(Self::NAME, "not running"));
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_scan_trims_whitespace() {
        let scan = RawScan::new("  SF16-3 \n");
        assert_eq!(scan.payload(), "SF16-3");
    }

    #[test]
    fn test_raw_scan_is_empty() {
        assert!(RawScan::new("   \n").is_empty());
        assert!(!RawScan::new("SF16-3").is_empty());
    }

    #[test]
    fn test_raw_scan_received_at_is_recent() {
        let scan = RawScan::new("SF16-3");
        assert!(scan.received_at().elapsed().as_secs() < 1);
    }

    #[test]
    fn test_stdin_source_name() {
        let source = StdinSource::new();
        assert_eq!(source.name(), "stdin");
    }

    #[test]
    fn test_stdin_source_not_running_initially() {
        let source = StdinSource::new();
        assert!(!source.is_running());
    }

    #[test]
    fn test_stdin_source_stop_before_start() {
        let mut source = StdinSource::new();
        let result = source.stop();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not running"));
    }
}
