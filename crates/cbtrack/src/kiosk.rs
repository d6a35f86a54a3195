//! Kiosk run loop for cbtrack.
//!
//! Wires the scan source, checkout flow, inventory, ledger, and flusher
//! together: the main loop consumes scans from the source channel and
//! drives the flow; background tasks flush the queue and refresh device
//! statuses from the remote sheet.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use regex::Regex;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::flow::{CheckoutFlow, ScanOutcome};
use crate::flush::{Flusher, SharedInventory, SharedLedger};
use crate::inventory::Inventory;
use crate::ledger::Ledger;
use crate::roster::Roster;
use crate::scan::{RawScan, ScanSource, StdinSource};
use crate::sheets::SheetStore;

/// Size of the scan channel between the source and the main loop.
const SCAN_CHANNEL_CAPACITY: usize = 16;

/// The assembled kiosk.
pub struct Kiosk {
    config: Config,
    roster: Roster,
    inventory: SharedInventory,
    ledger: SharedLedger,
    store: Arc<dyn SheetStore>,
    flow: CheckoutFlow,
    flush_kick: Arc<Notify>,
    device_pattern: Regex,
    last_scan: Option<(String, Instant)>,
}

impl std::fmt::Debug for Kiosk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kiosk")
            .field("roster_entries", &self.roster.len())
            .field("expecting", &self.flow.expecting())
            .finish_non_exhaustive()
    }
}

impl Kiosk {
    /// Assemble a kiosk from configuration and a sheet store.
    ///
    /// Loads the roster (required), the cached device statuses, and any
    /// queued entries left over from a previous run.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created or the
    /// local data files cannot be loaded.
    pub fn new(config: Config, store: Arc<dyn SheetStore>) -> Result<Self> {
        let data_dir = config.data_dir();
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir).map_err(|source| Error::DirectoryCreate {
                path: data_dir.clone(),
                source,
            })?;
        }

        let roster = Roster::load(config.roster_path())?;
        let inventory = Inventory::load(config.status_path())?;
        let ledger = Ledger::load(config.batch_path());

        let device_pattern =
            Regex::new(&config.inventory.device_pattern).map_err(|err| {
                Error::ConfigValidation {
                    message: format!("invalid device pattern: {err}"),
                }
            })?;

        info!(
            "Kiosk ready: {} students, {} devices, {} queued entries",
            roster.len(),
            inventory.len(),
            ledger.len()
        );

        Ok(Self {
            config,
            roster,
            inventory: Arc::new(Mutex::new(inventory)),
            ledger: Arc::new(Mutex::new(ledger)),
            store,
            flow: CheckoutFlow::new(),
            flush_kick: Arc::new(Notify::new()),
            device_pattern,
            last_scan: None,
        })
    }

    /// Run the kiosk until the scan source ends or Ctrl-C arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan source fails to start.
    pub async fn run(mut self) -> Result<()> {
        let (scan_tx, mut scan_rx) = mpsc::channel::<RawScan>(SCAN_CHANNEL_CAPACITY);

        // Config validation only admits "stdin" for now; new sources slot
        // in here.
        let mut source: Box<dyn ScanSource> = Box::new(StdinSource::new());
        source.start(scan_tx)?;
        info!("Scan source '{}' started", source.name());

        // Seed the inventory before accepting scans
        if let Err(err) = refresh_statuses(
            self.store.as_ref(),
            &self.inventory,
            &self.ledger,
            &self.device_pattern,
            &self.config.status_path(),
        )
        .await
        {
            warn!("Initial status refresh failed, using cached statuses: {err}");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let flusher = Flusher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.ledger),
            Arc::clone(&self.inventory),
            self.config.batch_path(),
            self.config.cooldown(),
        );
        let flush_handle = tokio::spawn(flusher.run(
            self.config.flush_interval(),
            Arc::clone(&self.flush_kick),
            shutdown_rx.clone(),
        ));

        let refresh_handle = self.config.refresh_interval().map(|interval| {
            tokio::spawn(refresh_loop(
                Arc::clone(&self.store),
                Arc::clone(&self.inventory),
                Arc::clone(&self.ledger),
                self.device_pattern.clone(),
                self.config.status_path(),
                interval,
                shutdown_rx,
            ))
        });

        info!("{}", self.flow.expecting().prompt());
        loop {
            tokio::select! {
                scan = scan_rx.recv() => {
                    match scan {
                        Some(scan) => {
                            self.handle_scan(&scan);
                        }
                        None => {
                            info!("Scan source ended");
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Exiting");
                    break;
                }
            }
        }

        if source.is_running() {
            if let Err(err) = source.stop() {
                warn!("Could not stop scan source: {err}");
            }
        }

        // Let background tasks finish; the flusher makes a final attempt
        let _ = shutdown_tx.send(true);
        if let Err(err) = flush_handle.await {
            warn!("Flush task panicked: {err}");
        }
        if let Some(handle) = refresh_handle {
            if let Err(err) = handle.await {
                warn!("Refresh task panicked: {err}");
            }
        }

        self.persist();
        Ok(())
    }

    /// Process one decoded scan.
    ///
    /// Returns `None` when the scan was dropped as scanner bounce.
    fn handle_scan(&mut self, scan: &RawScan) -> Option<ScanOutcome> {
        if self.is_bounce(scan) {
            debug!("Dropped repeated payload inside scan gap");
            return None;
        }
        self.last_scan = Some((scan.payload().to_string(), scan.received_at()));

        let outcome = {
            let inventory = self.inventory.lock().expect("inventory lock poisoned");
            self.flow.apply(scan.payload(), &self.roster, &inventory)
        };

        match &outcome {
            ScanOutcome::DeviceAccepted { device, action } => {
                info!("Obtained: {device} ({action})");
                info!("{}", self.flow.expecting().prompt());
            }
            ScanOutcome::Completed(entry) => {
                info!("Obtained: {}", entry.student);
                info!("Logged {} {} for {}", entry.device, entry.action, entry.student);
                self.record(entry.clone());
                info!("{}", self.flow.expecting().prompt());
            }
            ScanOutcome::OutOfOrder { expected, scanned } => {
                warn!("Not scanned in correct order: expected a {expected}, got a {scanned}");
                info!("{}", self.flow.expecting().prompt());
            }
            ScanOutcome::Unrecognized { .. } => {
                warn!("Unrecognized QR code");
                info!("{}", self.flow.expecting().prompt());
            }
        }

        Some(outcome)
    }

    /// Check whether a scan is a repeated read inside the scan gap.
    fn is_bounce(&self, scan: &RawScan) -> bool {
        self.last_scan.as_ref().is_some_and(|(payload, at)| {
            payload == scan.payload()
                && scan.received_at().duration_since(*at) < self.config.min_scan_gap()
        })
    }

    /// Apply a completed entry: flip the cache, persist, queue for flush.
    fn record(&mut self, entry: crate::ledger::LogEntry) {
        {
            let mut inventory = self.inventory.lock().expect("inventory lock poisoned");
            match inventory.flip(&entry.device) {
                Ok(status) => debug!("{} is now {status}", entry.device),
                Err(err) => warn!("Could not flip status: {err}"),
            }
            if let Err(err) = inventory.save(self.config.status_path()) {
                warn!("Could not persist status file: {err}");
            }
        }

        let queued = {
            let mut ledger = self.ledger.lock().expect("ledger lock poisoned");
            ledger.push(entry);
            if let Err(err) = ledger.save(self.config.batch_path()) {
                warn!("Could not persist batch file: {err}");
            }
            ledger.len()
        };

        if queued >= self.config.flush.max_batch {
            debug!("Queue reached {queued} entries, kicking flush");
            self.flush_kick.notify_one();
        }
    }

    /// Persist inventory and ledger on shutdown.
    fn persist(&self) {
        let inventory = self.inventory.lock().expect("inventory lock poisoned");
        if let Err(err) = inventory.save(self.config.status_path()) {
            warn!("Could not persist status file: {err}");
        }
        let ledger = self.ledger.lock().expect("ledger lock poisoned");
        if let Err(err) = ledger.save(self.config.batch_path()) {
            warn!("Could not persist batch file: {err}");
        }
        if !ledger.is_empty() {
            info!("{} entries remain queued for the next run", ledger.len());
        }
    }
}

/// Pull remote statuses and reconcile the local cache.
///
/// Rows whose ids do not match the device pattern are dropped; devices with
/// queued entries keep their optimistic local status. Returns the number of
/// devices adopted from the remote store.
///
/// # Errors
///
/// Returns an error if the remote store cannot be reached.
pub async fn refresh_statuses(
    store: &dyn SheetStore,
    inventory: &SharedInventory,
    ledger: &SharedLedger,
    device_pattern: &Regex,
    status_path: &Path,
) -> Result<usize> {
    let mut remote = store.pull_statuses().await?;

    let before = remote.len();
    remote.retain(|device, _| device_pattern.is_match(device));
    if remote.len() < before {
        warn!(
            "Dropped {} remote rows not matching the device pattern",
            before - remote.len()
        );
    }
    let adopted = remote.len();

    let pending: HashSet<String> = ledger
        .lock()
        .expect("ledger lock poisoned")
        .pending_devices();

    let mut inventory = inventory.lock().expect("inventory lock poisoned");
    inventory.reconcile(remote, &pending);
    if let Err(err) = inventory.save(status_path) {
        warn!("Could not persist status file after refresh: {err}");
    }

    debug!("Refreshed {adopted} device statuses");
    Ok(adopted)
}

/// Periodic status refresh until shutdown.
async fn refresh_loop(
    store: Arc<dyn SheetStore>,
    inventory: SharedInventory,
    ledger: SharedLedger,
    device_pattern: Regex,
    status_path: std::path::PathBuf,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the kiosk already did that refresh
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        if let Err(err) = refresh_statuses(
            store.as_ref(),
            &inventory,
            &ledger,
            &device_pattern,
            &status_path,
        )
        .await
        {
            warn!("Status refresh failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::flow::ScanKind;
    use crate::inventory::DeviceStatus;
    use crate::ledger::LogEntry;
    use crate::roster::hash_name;
    use crate::sheets::SheetError;

    struct MockStore {
        statuses: HashMap<String, DeviceStatus>,
    }

    #[async_trait::async_trait]
    impl SheetStore for MockStore {
        async fn pull_statuses(&self) -> std::result::Result<HashMap<String, DeviceStatus>, SheetError> {
            Ok(self.statuses.clone())
        }

        async fn apply(
            &self,
            _entries: &[LogEntry],
            _statuses: &HashMap<String, DeviceStatus>,
        ) -> std::result::Result<(), SheetError> {
            Ok(())
        }
    }

    fn test_data_dir(tag: &str) -> std::path::PathBuf {
        let dir =
            std::env::temp_dir().join(format!("cbtrack_kiosk_{tag}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_config(tag: &str) -> Config {
        let dir = test_data_dir(tag);

        let roster = Roster::build(["Doe, Jane"], "paws").unwrap();
        roster.save(dir.join("validation.json")).unwrap();

        let mut inventory = Inventory::new();
        inventory.set("SF16-1", DeviceStatus::In);
        inventory.set("SF16-2", DeviceStatus::Out);
        inventory.save(dir.join("status.json")).unwrap();

        let mut config = Config::default();
        config.data.data_dir = Some(dir);
        config
    }

    fn test_kiosk(tag: &str) -> Kiosk {
        let config = test_config(tag);
        let store = Arc::new(MockStore {
            statuses: HashMap::new(),
        });
        Kiosk::new(config, store).unwrap()
    }

    fn cleanup(tag: &str) {
        let _ = std::fs::remove_dir_all(test_data_dir(tag));
    }

    fn student_payload() -> String {
        hash_name("Jane Doe", "paws")
    }

    #[test]
    fn test_kiosk_new_loads_data_files() {
        let kiosk = test_kiosk("new");

        assert_eq!(kiosk.roster.len(), 1);
        assert_eq!(kiosk.inventory.lock().unwrap().len(), 2);
        assert!(kiosk.ledger.lock().unwrap().is_empty());

        cleanup("new");
    }

    #[test]
    fn test_kiosk_new_requires_roster() {
        let dir = test_data_dir("noroster");
        let mut config = Config::default();
        config.data.data_dir = Some(dir);

        let store = Arc::new(MockStore {
            statuses: HashMap::new(),
        });
        let result = Kiosk::new(config, store);
        assert!(result.is_err());

        cleanup("noroster");
    }

    #[test]
    fn test_handle_scan_full_cycle() {
        let mut kiosk = test_kiosk("cycle");

        let outcome = kiosk.handle_scan(&RawScan::new("SF16-1")).unwrap();
        assert!(matches!(outcome, ScanOutcome::DeviceAccepted { .. }));
        assert_eq!(kiosk.flow.expecting(), ScanKind::Student);

        let outcome = kiosk.handle_scan(&RawScan::new(student_payload())).unwrap();
        assert!(matches!(outcome, ScanOutcome::Completed(_)));

        // Cache flipped, entry queued, both persisted
        assert_eq!(
            kiosk.inventory.lock().unwrap().status("SF16-1"),
            Some(DeviceStatus::Out)
        );
        assert_eq!(kiosk.ledger.lock().unwrap().len(), 1);

        let saved = Inventory::load(kiosk.config.status_path()).unwrap();
        assert_eq!(saved.status("SF16-1"), Some(DeviceStatus::Out));
        let saved = Ledger::load(kiosk.config.batch_path());
        assert_eq!(saved.len(), 1);

        cleanup("cycle");
    }

    #[test]
    fn test_handle_scan_rejects_out_of_order() {
        let mut kiosk = test_kiosk("order");

        let outcome = kiosk.handle_scan(&RawScan::new(student_payload())).unwrap();
        assert!(matches!(outcome, ScanOutcome::OutOfOrder { .. }));
        assert!(kiosk.ledger.lock().unwrap().is_empty());

        cleanup("order");
    }

    #[test]
    fn test_handle_scan_rejects_unrecognized() {
        let mut kiosk = test_kiosk("unknown");

        let outcome = kiosk.handle_scan(&RawScan::new("garbage")).unwrap();
        assert!(matches!(outcome, ScanOutcome::Unrecognized { .. }));

        cleanup("unknown");
    }

    #[test]
    fn test_handle_scan_debounces_repeats() {
        let mut kiosk = test_kiosk("bounce");

        let first = kiosk.handle_scan(&RawScan::new("SF16-1"));
        assert!(first.is_some());

        // The same payload again, well inside the gap
        let second = kiosk.handle_scan(&RawScan::new("SF16-1"));
        assert!(second.is_none());

        // A different payload is not a bounce
        let third = kiosk.handle_scan(&RawScan::new(student_payload()));
        assert!(third.is_some());

        cleanup("bounce");
    }

    #[tokio::test]
    async fn test_handle_scan_kicks_flush_at_threshold() {
        let mut config = test_config("threshold");
        config.flush.max_batch = 1;
        let store = Arc::new(MockStore {
            statuses: HashMap::new(),
        });
        let mut kiosk = Kiosk::new(config, store).unwrap();

        kiosk.handle_scan(&RawScan::new("SF16-1"));
        kiosk.handle_scan(&RawScan::new(student_payload()));

        // The kick must have been signalled
        let kick = Arc::clone(&kiosk.flush_kick);
        tokio::time::timeout(std::time::Duration::from_millis(10), kick.notified())
            .await
            .expect("flush kick was not signalled");

        cleanup("threshold");
    }

    #[tokio::test]
    async fn test_refresh_statuses_filters_and_reconciles() {
        let mut statuses = HashMap::new();
        statuses.insert("SF16-1".to_string(), DeviceStatus::Out);
        statuses.insert("SF16-2".to_string(), DeviceStatus::In);
        statuses.insert("Device name".to_string(), DeviceStatus::In); // header junk
        let store = MockStore { statuses };

        let inventory: SharedInventory = Arc::new(Mutex::new(Inventory::new()));
        let ledger: SharedLedger = Arc::new(Mutex::new(Ledger::new()));
        let pattern = Regex::new(r"^[A-Za-z]+[0-9]*-[0-9]+$").unwrap();
        let dir = test_data_dir("refresh");
        let status_path = dir.join("status.json");

        let adopted = refresh_statuses(&store, &inventory, &ledger, &pattern, &status_path)
            .await
            .unwrap();

        assert_eq!(adopted, 2);
        let inventory = inventory.lock().unwrap();
        assert_eq!(inventory.len(), 2);
        assert!(!inventory.contains("Device name"));
        assert_eq!(inventory.status("SF16-1"), Some(DeviceStatus::Out));

        cleanup("refresh");
    }

    #[tokio::test]
    async fn test_refresh_statuses_keeps_pending_flip() {
        let mut statuses = HashMap::new();
        statuses.insert("SF16-1".to_string(), DeviceStatus::In);
        let store = MockStore { statuses };

        let mut local = Inventory::new();
        local.set("SF16-1", DeviceStatus::Out); // optimistic flip not yet flushed
        let inventory: SharedInventory = Arc::new(Mutex::new(local));

        let mut queue = Ledger::new();
        queue.push(LogEntry::new("SF16-1", DeviceStatus::Out, "Jane Doe"));
        let ledger: SharedLedger = Arc::new(Mutex::new(queue));

        let pattern = Regex::new(r"^[A-Za-z]+[0-9]*-[0-9]+$").unwrap();
        let dir = test_data_dir("pending");
        let status_path = dir.join("status.json");

        refresh_statuses(&store, &inventory, &ledger, &pattern, &status_path)
            .await
            .unwrap();

        assert_eq!(
            inventory.lock().unwrap().status("SF16-1"),
            Some(DeviceStatus::Out)
        );

        cleanup("pending");
    }
}
