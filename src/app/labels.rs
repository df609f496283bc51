use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::app::bridge::DeviceBridge;
use crate::app::store::PackageCacheStore;

/// Resolves human-readable application labels in the background.
///
/// Labels are cosmetic: resolution never blocks the package list, failures
/// leave the package name on display, and results trickle into the cache in
/// batches so a long device roster shows progress instead of one final
/// update. Cancellation is checked at batch boundaries; a batch that was
/// in flight when the flag went up is discarded rather than applied.
pub struct LabelResolver {
    bridge: Arc<dyn DeviceBridge>,
    store: Arc<PackageCacheStore>,
    batch_size: usize,
    cancel: Mutex<Arc<AtomicBool>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LabelResolver {
    pub fn new(
        bridge: Arc<dyn DeviceBridge>,
        store: Arc<PackageCacheStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            bridge,
            store,
            batch_size: batch_size.max(1),
            cancel: Mutex::new(Arc::new(AtomicBool::new(false))),
            worker: Mutex::new(None),
        }
    }

    /// Kicks off resolution for `names` on a worker thread. A run already
    /// in progress is cancelled first; its unapplied batches are dropped.
    pub fn start(&self, serial: &str, names: Vec<String>, trace_id: &str) {
        let cancel = {
            let mut slot = self.cancel.lock().expect("label cancel lock");
            slot.store(true, Ordering::SeqCst);
            let fresh = Arc::new(AtomicBool::new(false));
            *slot = Arc::clone(&fresh);
            fresh
        };

        let bridge = Arc::clone(&self.bridge);
        let store = Arc::clone(&self.store);
        let serial = serial.to_string();
        let trace_id = trace_id.to_string();
        let batch_size = self.batch_size;

        let handle = thread::spawn(move || {
            resolve_in_batches(
                bridge.as_ref(),
                &store,
                &serial,
                &names,
                batch_size,
                &cancel,
                &trace_id,
            );
        });
        if let Some(previous) = self.worker.lock().expect("label worker lock").replace(handle) {
            // Previous worker sees its stale cancel flag and exits shortly.
            drop(previous);
        }
    }

    /// Stops the current run and waits for the worker to wind down.
    pub fn stop(&self) {
        self.cancel
            .lock()
            .expect("label cancel lock")
            .store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().expect("label worker lock").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LabelResolver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn resolve_in_batches(
    bridge: &dyn DeviceBridge,
    store: &PackageCacheStore,
    serial: &str,
    names: &[String],
    batch_size: usize,
    cancel: &AtomicBool,
    trace_id: &str,
) {
    let mut applied = 0usize;
    for chunk in names.chunks(batch_size) {
        if cancel.load(Ordering::SeqCst) {
            info!(trace_id = %trace_id, serial = %serial, applied, "label resolution cancelled");
            return;
        }
        let mut resolved = Vec::with_capacity(chunk.len());
        for name in chunk {
            match bridge.resolve_label(serial, name, trace_id) {
                Ok(Some(label)) => resolved.push((name.clone(), label)),
                Ok(None) => {
                    debug!(trace_id = %trace_id, package = %name, "no label available");
                }
                Err(err) => {
                    warn!(
                        trace_id = %trace_id,
                        package = %name,
                        error = %err,
                        "label resolution failed"
                    );
                }
            }
        }
        // Cancellation between resolving and applying discards the batch.
        if cancel.load(Ordering::SeqCst) {
            info!(trace_id = %trace_id, serial = %serial, applied, "label resolution cancelled");
            return;
        }
        applied += resolved.len();
        store.apply_labels(serial, &resolved);
    }
    info!(trace_id = %trace_id, serial = %serial, applied, total = names.len(), "label resolution complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::error::AppError;
    use crate::app::models::{
        BackupArchiveRecord, DeviceInfo, LifecycleAction, PackageRecord,
    };
    use std::path::Path;
    use tempfile::TempDir;

    struct LabelBridge {
        fail_for: Vec<&'static str>,
    }

    impl DeviceBridge for LabelBridge {
        fn list_devices(&self, _t: &str) -> Result<Vec<DeviceInfo>, AppError> {
            Ok(Vec::new())
        }
        fn list_packages(&self, _s: &str, _t: &str) -> Result<Vec<PackageRecord>, AppError> {
            Ok(Vec::new())
        }
        fn resolve_label(&self, _s: &str, package: &str, trace_id: &str) -> Result<Option<String>, AppError> {
            if self.fail_for.contains(&package) {
                return Err(AppError::device("aapt exploded", trace_id));
            }
            if package.ends_with(".bare") {
                return Ok(None);
            }
            Ok(Some(format!("Label of {package}")))
        }
        fn perform_backup(
            &self,
            _s: &str,
            _p: &PackageRecord,
            _d: &Path,
            t: &str,
        ) -> Result<BackupArchiveRecord, AppError> {
            Err(AppError::system("unsupported", t))
        }
        fn perform_restore(&self, _s: &str, _a: &Path, t: &str) -> Result<(), AppError> {
            Err(AppError::system("unsupported", t))
        }
        fn delete_backup(&self, _a: &Path, t: &str) -> Result<(), AppError> {
            Err(AppError::system("unsupported", t))
        }
        fn apply_lifecycle_action(
            &self,
            _s: &str,
            _p: &str,
            _a: LifecycleAction,
            t: &str,
        ) -> Result<(), AppError> {
            Err(AppError::system("unsupported", t))
        }
        fn package_size(&self, _s: &str, _p: &PackageRecord, t: &str) -> Result<u64, AppError> {
            Err(AppError::system("unsupported", t))
        }
        fn run_shell(&self, _s: Option<&str>, _c: &str, t: &str) -> Result<String, AppError> {
            Err(AppError::system("unsupported", t))
        }
    }

    fn seeded_store(dir: &TempDir, serial: &str, names: &[&str]) -> Arc<PackageCacheStore> {
        let store = Arc::new(PackageCacheStore::new(dir.path()));
        let packages = names
            .iter()
            .map(|name| PackageRecord::installed(*name, Some("/data/app/x".to_string()), false))
            .collect();
        store.update_profile(serial, packages, None);
        store
    }

    #[test]
    fn failures_and_missing_labels_leave_the_name_unlabelled() {
        let dir = TempDir::new().expect("tmp");
        let store = seeded_store(&dir, "SER1", &["com.a", "com.b.bare", "com.c"]);
        let bridge = LabelBridge {
            fail_for: vec!["com.c"],
        };
        let names: Vec<String> = vec!["com.a".into(), "com.b.bare".into(), "com.c".into()];
        resolve_in_batches(
            &bridge,
            &store,
            "SER1",
            &names,
            2,
            &AtomicBool::new(false),
            "trace-1",
        );

        let packages = store.get_packages("SER1").expect("cache");
        let label_of = |name: &str| {
            packages
                .iter()
                .find(|p| p.name == name)
                .and_then(|p| p.label.clone())
        };
        assert_eq!(label_of("com.a").as_deref(), Some("Label of com.a"));
        assert_eq!(label_of("com.b.bare"), None);
        assert_eq!(label_of("com.c"), None);
    }

    #[test]
    fn cancellation_before_first_batch_applies_nothing() {
        let dir = TempDir::new().expect("tmp");
        let store = seeded_store(&dir, "SER1", &["com.a", "com.b"]);
        let bridge = LabelBridge { fail_for: vec![] };
        let cancel = AtomicBool::new(true);
        resolve_in_batches(
            &bridge,
            &store,
            "SER1",
            &["com.a".to_string(), "com.b".to_string()],
            10,
            &cancel,
            "trace-2",
        );
        let packages = store.get_packages("SER1").expect("cache");
        assert!(packages.iter().all(|p| p.label.is_none()));
    }

    #[test]
    fn start_then_stop_joins_the_worker() {
        let dir = TempDir::new().expect("tmp");
        let store = seeded_store(&dir, "SER1", &["com.a"]);
        let resolver = LabelResolver::new(Arc::new(LabelBridge { fail_for: vec![] }), store, 10);
        resolver.start("SER1", vec!["com.a".to_string()], "trace-3");
        resolver.stop();
        // Second stop is a no-op.
        resolver.stop();
    }
}
