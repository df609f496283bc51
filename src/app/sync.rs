use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::app::bridge::DeviceBridge;
use crate::app::error::AppError;
use crate::app::models::{PackageRecord, SyncResult};
use crate::app::store::PackageCacheStore;

/// Reconciles the durable package cache against the live device.
///
/// Two explicit phases: `load` serves whatever the cache holds without
/// touching the bridge, `sync` performs the authoritative refresh. Callers
/// render the loaded list immediately and fold the sync diff in when it
/// lands; a transport failure during sync leaves the stale cache untouched
/// because staleness beats emptiness.
pub struct PackageSyncEngine {
    bridge: Arc<dyn DeviceBridge>,
    store: Arc<PackageCacheStore>,
}

impl PackageSyncEngine {
    pub fn new(bridge: Arc<dyn DeviceBridge>, store: Arc<PackageCacheStore>) -> Self {
        Self { bridge, store }
    }

    /// Non-blocking: the cached list for this device, if any.
    pub fn load(&self, serial: &str) -> Option<Vec<PackageRecord>> {
        self.store.get_packages(serial)
    }

    /// Blocking: queries the bridge, merges with tombstone semantics,
    /// persists the result and returns the diff.
    pub fn sync(&self, serial: &str, trace_id: &str) -> Result<SyncResult, AppError> {
        let report = match self.bridge.list_packages(serial, trace_id) {
            Ok(report) => report,
            Err(err) => {
                warn!(
                    trace_id = %trace_id,
                    serial = %serial,
                    error = %err,
                    "package sync failed; serving stale cache"
                );
                return Err(err);
            }
        };

        let cached = self.store.get_packages(serial).unwrap_or_default();
        let (merged, result) = merge_report(&cached, &report);
        self.store.update_profile(serial, merged, None);

        info!(
            trace_id = %trace_id,
            serial = %serial,
            added = result.added.len(),
            removed = result.removed.len(),
            changed = result.changed.len(),
            total = result.total,
            "package sync complete"
        );
        Ok(result)
    }
}

/// Merges a device report into the cached records.
///
/// Every reported package ends up in the output; cached packages absent from
/// the report become tombstones rather than disappearing. Labels survive the
/// merge, and `is_system` is sticky once observed. The output is sorted by
/// name so repeated merges are byte-stable.
pub fn merge_report(
    cached: &[PackageRecord],
    report: &[PackageRecord],
) -> (Vec<PackageRecord>, SyncResult) {
    let cached_by_name: HashMap<&str, &PackageRecord> =
        cached.iter().map(|record| (record.name.as_str(), record)).collect();

    let mut added = Vec::new();
    let mut changed = Vec::new();
    let mut merged = Vec::with_capacity(report.len());

    for reported in report {
        match cached_by_name.get(reported.name.as_str()) {
            None => {
                added.push(reported.name.clone());
                merged.push(reported.clone());
            }
            Some(old) => {
                if old.is_disabled != reported.is_disabled
                    || old.is_uninstalled != reported.is_uninstalled
                {
                    changed.push(reported.name.clone());
                }
                let mut record = reported.clone();
                record.label = old.label.clone();
                record.is_system = old.is_system || reported.is_system;
                merged.push(record);
            }
        }
    }

    let mut removed = Vec::new();
    let reported_names: std::collections::HashSet<&str> =
        report.iter().map(|record| record.name.as_str()).collect();
    for old in cached {
        if reported_names.contains(old.name.as_str()) {
            continue;
        }
        if !old.is_uninstalled {
            removed.push(old.name.clone());
        }
        let mut tombstone = old.clone();
        tombstone.is_uninstalled = true;
        tombstone.install_path = None;
        merged.push(tombstone);
    }

    merged.sort_by(|a, b| a.name.cmp(&b.name));
    added.sort();
    removed.sort();
    changed.sort();

    let result = SyncResult {
        added,
        removed,
        changed,
        total: report.len(),
    };
    (merged, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{BackupArchiveRecord, DeviceInfo, LifecycleAction};
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn pkg(name: &str, is_system: bool) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            install_path: Some(format!("/data/app/{name}/base.apk")),
            is_system,
            is_disabled: false,
            is_uninstalled: false,
            label: None,
        }
    }

    struct ScriptedBridge {
        responses: Mutex<Vec<Result<Vec<PackageRecord>, AppError>>>,
    }

    impl ScriptedBridge {
        fn new(responses: Vec<Result<Vec<PackageRecord>, AppError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    impl DeviceBridge for ScriptedBridge {
        fn list_devices(&self, _trace_id: &str) -> Result<Vec<DeviceInfo>, AppError> {
            Ok(Vec::new())
        }
        fn list_packages(&self, _serial: &str, trace_id: &str) -> Result<Vec<PackageRecord>, AppError> {
            let mut responses = self.responses.lock().expect("responses");
            if responses.is_empty() {
                return Err(AppError::transport("script exhausted", trace_id));
            }
            responses.remove(0)
        }
        fn resolve_label(&self, _s: &str, _p: &str, _t: &str) -> Result<Option<String>, AppError> {
            Ok(None)
        }
        fn perform_backup(
            &self,
            _s: &str,
            _p: &PackageRecord,
            _d: &Path,
            trace_id: &str,
        ) -> Result<BackupArchiveRecord, AppError> {
            Err(AppError::system("unsupported in scripted bridge", trace_id))
        }
        fn perform_restore(&self, _s: &str, _a: &Path, trace_id: &str) -> Result<(), AppError> {
            Err(AppError::system("unsupported in scripted bridge", trace_id))
        }
        fn delete_backup(&self, _a: &Path, trace_id: &str) -> Result<(), AppError> {
            Err(AppError::system("unsupported in scripted bridge", trace_id))
        }
        fn apply_lifecycle_action(
            &self,
            _s: &str,
            _p: &str,
            _a: LifecycleAction,
            trace_id: &str,
        ) -> Result<(), AppError> {
            Err(AppError::system("unsupported in scripted bridge", trace_id))
        }
        fn package_size(&self, _s: &str, _p: &PackageRecord, trace_id: &str) -> Result<u64, AppError> {
            Err(AppError::system("unsupported in scripted bridge", trace_id))
        }
        fn run_shell(&self, _s: Option<&str>, _c: &str, trace_id: &str) -> Result<String, AppError> {
            Err(AppError::system("unsupported in scripted bridge", trace_id))
        }
    }

    #[test]
    fn merge_tombstones_removed_packages() {
        // Cache has A (user) and B (system); device now reports A and C.
        let cached = vec![pkg("com.a", false), pkg("com.b", true)];
        let report = vec![pkg("com.a", false), pkg("com.c", false)];

        let (merged, result) = merge_report(&cached, &report);
        assert_eq!(result.added, vec!["com.c".to_string()]);
        assert_eq!(result.removed, vec!["com.b".to_string()]);
        assert!(result.changed.is_empty());
        assert_eq!(result.total, 2);

        assert_eq!(merged.len(), 3);
        let b = merged.iter().find(|r| r.name == "com.b").expect("tombstone");
        assert!(b.is_uninstalled);
        assert!(b.is_system, "is_system sticks on the tombstone");
        assert_eq!(b.install_path, None);
        assert!(!merged.iter().find(|r| r.name == "com.a").unwrap().is_uninstalled);
    }

    #[test]
    fn merge_detects_state_changes_and_keeps_labels() {
        let mut cached_pkg = pkg("com.a", false);
        cached_pkg.label = Some("App A".to_string());
        let mut reported = pkg("com.a", false);
        reported.is_disabled = true;

        let (merged, result) = merge_report(&[cached_pkg], &[reported]);
        assert_eq!(result.changed, vec!["com.a".to_string()]);
        assert!(merged[0].is_disabled);
        assert_eq!(merged[0].label.as_deref(), Some("App A"));
    }

    #[test]
    fn merge_is_idempotent() {
        let cached = vec![pkg("com.a", false), pkg("com.b", true)];
        let report = vec![pkg("com.a", false), pkg("com.c", false)];

        let (merged_once, _) = merge_report(&cached, &report);
        let (merged_twice, second) = merge_report(&merged_once, &report);
        assert!(second.is_noop(), "second sync with unchanged device is a no-op");
        assert_eq!(merged_once, merged_twice);
    }

    #[test]
    fn tombstones_are_never_physically_removed_by_merge() {
        let mut tombstone = pkg("com.gone", false);
        tombstone.is_uninstalled = true;
        tombstone.install_path = None;
        let cached = vec![tombstone.clone(), pkg("com.a", false)];

        let (merged, result) = merge_report(&cached, &[pkg("com.a", false)]);
        assert!(result.removed.is_empty(), "already-tombstoned is not removed again");
        assert!(merged.iter().any(|r| r.name == "com.gone" && r.is_uninstalled));
    }

    #[test]
    fn sync_persists_merge_and_serves_stale_cache_on_transport_failure() {
        let dir = TempDir::new().expect("tmp");
        let store = Arc::new(PackageCacheStore::new(dir.path()));
        let bridge = Arc::new(ScriptedBridge::new(vec![
            Ok(vec![pkg("com.a", false), pkg("com.b", true)]),
            Err(AppError::transport("bridge unreachable", "trace-x")),
        ]));
        let engine = PackageSyncEngine::new(bridge, Arc::clone(&store));

        assert!(engine.load("SER1").is_none());
        let first = engine.sync("SER1", "trace-1").expect("first sync");
        assert_eq!(first.added.len(), 2);

        // Transport failure: error surfaces, cache is untouched.
        let err = engine.sync("SER1", "trace-2").expect_err("transport error");
        assert!(err.is_transport());
        let loaded = engine.load("SER1").expect("stale cache still served");
        assert_eq!(loaded.len(), 2);
    }
}
