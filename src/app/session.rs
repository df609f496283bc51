use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::app::bridge::DeviceBridge;
use crate::app::config::AppConfig;
use crate::app::labels::LabelResolver;
use crate::app::models::{BackupArchiveRecord, PackageRecord};
use crate::app::monitor::ConnectionEvent;
use crate::app::store::PackageCacheStore;

/// Packages picked for the next batch operation, with a running size
/// tally. Membership checks are O(1). A package whose size could not be
/// determined stays selected and contributes zero bytes to the tally; the
/// understatement is logged, not surfaced as an error.
#[derive(Debug, Default)]
pub struct PackageSelection {
    selected: HashMap<String, u64>,
    total_bytes: u64,
}

impl PackageSelection {
    pub fn contains(&self, name: &str) -> bool {
        self.selected.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Selection order is irrelevant to batches; names come out sorted so
    /// the run order is predictable.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.selected.keys().cloned().collect();
        names.sort();
        names
    }

    fn insert(&mut self, name: &str, size_bytes: u64) {
        if self.selected.insert(name.to_string(), size_bytes).is_none() {
            self.total_bytes += size_bytes;
        }
    }

    fn remove(&mut self, name: &str) {
        if let Some(size_bytes) = self.selected.remove(name) {
            self.total_bytes -= size_bytes;
        }
    }

    fn clear(&mut self) {
        self.selected.clear();
        self.total_bytes = 0;
    }
}

/// Backup archives picked for restore or deletion. Sizes are already known
/// from the filesystem listing, so the tally never needs a device round
/// trip.
#[derive(Debug, Default)]
pub struct ArchiveSelection {
    selected: HashMap<PathBuf, u64>,
    total_bytes: u64,
}

impl ArchiveSelection {
    pub fn contains(&self, path: &PathBuf) -> bool {
        self.selected.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.selected.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn toggle(&mut self, archive: &BackupArchiveRecord) {
        if let Some(size_bytes) = self.selected.remove(&archive.path) {
            self.total_bytes -= size_bytes;
        } else {
            self.selected.insert(archive.path.clone(), archive.size_bytes);
            self.total_bytes += archive.size_bytes;
        }
    }

    fn clear(&mut self) {
        self.selected.clear();
        self.total_bytes = 0;
    }
}

#[derive(Debug, Default)]
struct Selections {
    packages: PackageSelection,
    archives: ArchiveSelection,
}

/// Per-device working state: both selections plus the label resolver tied
/// to this device. Both selections live behind one lock so a disconnect
/// clears them atomically; no reader ever observes one cleared and the
/// other not.
pub struct DeviceSession {
    serial: String,
    bridge: Arc<dyn DeviceBridge>,
    resolver: LabelResolver,
    selections: Mutex<Selections>,
}

impl DeviceSession {
    pub fn new(
        serial: &str,
        bridge: Arc<dyn DeviceBridge>,
        store: Arc<PackageCacheStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            serial: serial.to_string(),
            bridge: Arc::clone(&bridge),
            resolver: LabelResolver::new(bridge, store, config.labels.batch_size),
            selections: Mutex::new(Selections::default()),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn resolver(&self) -> &LabelResolver {
        &self.resolver
    }

    /// Adds or removes a package from the selection. On select, the size
    /// is fetched once; a lookup failure keeps the package selected with a
    /// zero contribution.
    ///
    /// The lock is not held across the size round-trip: a slow lookup must
    /// not stall progress reads or the disconnects that clear selections.
    pub fn toggle_package(&self, record: &PackageRecord, trace_id: &str) {
        {
            let mut selections = self.selections.lock().expect("session selections lock");
            if selections.packages.contains(&record.name) {
                selections.packages.remove(&record.name);
                return;
            }
        }
        let size_bytes = match self.bridge.package_size(&self.serial, record, trace_id) {
            Ok(size_bytes) => size_bytes,
            Err(err) => {
                warn!(
                    trace_id = %trace_id,
                    package = %record.name,
                    error = %err,
                    "package size unavailable; tally will understate"
                );
                0
            }
        };
        // Membership may have changed while the lock was released; insert
        // only counts the package once either way.
        let mut selections = self.selections.lock().expect("session selections lock");
        selections.packages.insert(&record.name, size_bytes);
    }

    pub fn toggle_archive(&self, archive: &BackupArchiveRecord) {
        let mut selections = self.selections.lock().expect("session selections lock");
        selections.archives.toggle(archive);
    }

    pub fn selected_packages(&self) -> (Vec<String>, u64) {
        let selections = self.selections.lock().expect("session selections lock");
        (selections.packages.names(), selections.packages.total_bytes())
    }

    pub fn selected_archives(&self) -> (Vec<PathBuf>, u64) {
        let selections = self.selections.lock().expect("session selections lock");
        (selections.archives.paths(), selections.archives.total_bytes())
    }

    pub fn clear_selections(&self) {
        let mut selections = self.selections.lock().expect("session selections lock");
        selections.packages.clear();
        selections.archives.clear();
    }

    /// Connection edges from the monitor. Disconnect wipes both selections
    /// in one critical section; stale selections must not survive into a
    /// reconnect.
    pub fn handle_connection_event(&self, event: &ConnectionEvent, trace_id: &str) {
        if let ConnectionEvent::Disconnected = event {
            info!(trace_id = %trace_id, serial = %self.serial, "device disconnected; clearing selections");
            self.clear_selections();
        }
    }

    /// Ends the session: stops background label resolution and drops all
    /// selections.
    pub fn teardown(&self) {
        self.resolver.stop();
        self.clear_selections();
    }
}
