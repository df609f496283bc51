use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A device as reported by `adb devices -l`, plus the root probe result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial: String,
    pub state: String,
    pub model: Option<String>,
    pub authorized: bool,
    pub rooted: bool,
}

impl DeviceInfo {
    pub fn is_usable(&self) -> bool {
        self.authorized && self.state == "device"
    }
}

/// One package as tracked in the per-device cache.
///
/// `name` is the only identity; two records with the same name never coexist
/// in a profile. A package that disappears from the device is kept as a
/// tombstone (`is_uninstalled = true`) so its history and label survive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub install_path: Option<String>,
    pub is_system: bool,
    pub is_disabled: bool,
    pub is_uninstalled: bool,
    pub label: Option<String>,
}

impl PackageRecord {
    pub fn installed(name: impl Into<String>, install_path: Option<String>, is_system: bool) -> Self {
        Self {
            name: name.into(),
            install_path,
            is_system,
            is_disabled: false,
            is_uninstalled: false,
            label: None,
        }
    }
}

/// Durable per-device snapshot persisted by the cache store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceProfile {
    pub serial: String,
    pub model: Option<String>,
    pub last_sync: String,
    pub packages: Vec<PackageRecord>,
}

/// Diff produced by one reconciliation cycle. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncResult {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    pub total: usize,
}

impl SyncResult {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// A complete backup archive on disk. No partial state exists: an archive
/// either exists complete or does not exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupArchiveRecord {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Disable,
    Enable,
    Uninstall,
    Reinstall,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Disable => "disable",
            LifecycleAction::Enable => "enable",
            LifecycleAction::Uninstall => "uninstall",
            LifecycleAction::Reinstall => "reinstall",
        }
    }
}
