use std::path::Path;

use crate::app::error::AppError;
use crate::app::models::{BackupArchiveRecord, DeviceInfo, LifecycleAction, PackageRecord};

/// The privileged helper boundary. Everything that actually talks to a device
/// goes through this trait; the sync engine, label resolver, batch
/// orchestrator and connection monitor only ever see this surface.
///
/// Implementations are expected to serialize operations per logical channel
/// themselves where the underlying transport requires it; callers guarantee
/// that operations within a single batch or a single sync never overlap.
pub trait DeviceBridge: Send + Sync {
    fn list_devices(&self, trace_id: &str) -> Result<Vec<DeviceInfo>, AppError>;

    /// Authoritative package listing, including disabled and tombstoned
    /// (`-u`) packages.
    fn list_packages(&self, serial: &str, trace_id: &str) -> Result<Vec<PackageRecord>, AppError>;

    /// Best-effort display-name lookup. `Ok(None)` is a valid outcome.
    fn resolve_label(
        &self,
        serial: &str,
        package: &str,
        trace_id: &str,
    ) -> Result<Option<String>, AppError>;

    /// Creates a complete archive for one package and returns its identity.
    fn perform_backup(
        &self,
        serial: &str,
        package: &PackageRecord,
        dest_dir: &Path,
        trace_id: &str,
    ) -> Result<BackupArchiveRecord, AppError>;

    fn perform_restore(&self, serial: &str, archive_path: &Path, trace_id: &str)
        -> Result<(), AppError>;

    fn delete_backup(&self, archive_path: &Path, trace_id: &str) -> Result<(), AppError>;

    fn apply_lifecycle_action(
        &self,
        serial: &str,
        package: &str,
        action: LifecycleAction,
        trace_id: &str,
    ) -> Result<(), AppError>;

    /// Best-effort installed size in bytes; failure is tolerated by callers.
    fn package_size(
        &self,
        serial: &str,
        package: &PackageRecord,
        trace_id: &str,
    ) -> Result<u64, AppError>;

    /// Raw shell passthrough for the terminal collaborator.
    fn run_shell(
        &self,
        serial: Option<&str>,
        command: &str,
        trace_id: &str,
    ) -> Result<String, AppError>;
}
