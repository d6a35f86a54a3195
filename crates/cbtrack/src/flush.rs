//! Batch flush with rate-limit backoff.
//!
//! The [`Flusher`] owns the periodic push of queued ledger entries to the
//! remote sheet. It flushes on a fixed interval, or immediately when the
//! kiosk signals that the queue hit its size threshold. A remote rate limit
//! suspends flushing for a fixed cooldown window; any other error leaves
//! the queue intact for the next tick.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::inventory::Inventory;
use crate::ledger::Ledger;
use crate::sheets::{SheetError, SheetStore};

/// Shared handle to the ledger queue.
pub type SharedLedger = Arc<Mutex<Ledger>>;

/// Shared handle to the device inventory.
pub type SharedInventory = Arc<Mutex<Inventory>>;

/// Result of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued.
    Empty,
    /// The given number of entries was flushed and acknowledged.
    Flushed(usize),
    /// Skipped: a cooldown window from an earlier rate limit is active.
    CoolingDown,
    /// The remote rate-limited this attempt; a cooldown window started.
    RateLimited,
}

/// Periodic flusher for the ledger queue.
pub struct Flusher {
    store: Arc<dyn SheetStore>,
    ledger: SharedLedger,
    inventory: SharedInventory,
    batch_path: PathBuf,
    cooldown: Duration,
    cooldown_until: Option<Instant>,
}

impl std::fmt::Debug for Flusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flusher")
            .field("batch_path", &self.batch_path)
            .field("cooldown", &self.cooldown)
            .field("cooldown_until", &self.cooldown_until)
            .finish_non_exhaustive()
    }
}

impl Flusher {
    /// Create a new flusher.
    #[must_use]
    pub fn new(
        store: Arc<dyn SheetStore>,
        ledger: SharedLedger,
        inventory: SharedInventory,
        batch_path: PathBuf,
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            inventory,
            batch_path,
            cooldown,
            cooldown_until: None,
        }
    }

    /// Check if a rate-limit cooldown is currently active.
    #[must_use]
    pub fn is_cooling_down(&self) -> bool {
        self.cooldown_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// Attempt one flush.
    ///
    /// Snapshots the queue, sends it together with the current status cells,
    /// and acknowledges exactly that snapshot on success. Entries pushed
    /// while the request was in flight stay queued.
    ///
    /// # Errors
    ///
    /// Returns an error for remote failures other than rate limiting; the
    /// queue is left intact either way.
    pub async fn flush_once(&mut self) -> Result<FlushOutcome, SheetError> {
        if self.is_cooling_down() {
            debug!("Flush skipped, cooldown active");
            return Ok(FlushOutcome::CoolingDown);
        }
        self.cooldown_until = None;

        let entries = self.ledger.lock().expect("ledger lock poisoned").snapshot();
        if entries.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        let statuses = self
            .inventory
            .lock()
            .expect("inventory lock poisoned")
            .snapshot();

        info!("Flushing {} entries", entries.len());
        match self.store.apply(&entries, &statuses).await {
            Ok(()) => {
                let mut ledger = self.ledger.lock().expect("ledger lock poisoned");
                ledger.acknowledge(entries.len());
                if let Err(err) = ledger.save(&self.batch_path) {
                    warn!("Could not persist batch file after flush: {err}");
                }
                info!("Flushed {} entries", entries.len());
                Ok(FlushOutcome::Flushed(entries.len()))
            }
            Err(err) if err.is_rate_limited() => {
                self.cooldown_until = Some(Instant::now() + self.cooldown);
                warn!(
                    "Rate limited, suspending flushes for {}s: {err}",
                    self.cooldown.as_secs()
                );
                Ok(FlushOutcome::RateLimited)
            }
            Err(err) => Err(err),
        }
    }

    /// Run the flush loop until shutdown.
    ///
    /// Flushes on every interval tick and whenever `kick` is notified (the
    /// kiosk kicks it when the queue reaches its size threshold). On
    /// shutdown a final best-effort flush runs unless a cooldown is active.
    pub async fn run(
        mut self,
        interval: Duration,
        kick: Arc<Notify>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = kick.notified() => {
                    debug!("Flush kicked by queue threshold");
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(err) = self.flush_once().await {
                warn!("Flush failed, will retry: {err}");
            }
        }

        // Final best-effort flush so a clean shutdown leaves nothing queued
        match self.flush_once().await {
            Ok(FlushOutcome::Flushed(count)) => info!("Final flush pushed {count} entries"),
            Ok(_) => {}
            Err(err) => warn!("Final flush failed, entries stay queued: {err}"),
        }
    }
}
