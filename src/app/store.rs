use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::warn;

use crate::app::models::{DeviceProfile, PackageRecord};

/// Durable per-device package table. One JSON profile per serial under the
/// cache directory, mirrored in memory for instant reads.
///
/// Single-writer discipline: only the sync engine and lifecycle-action
/// completions mutate packages, and lifecycle completions do so by triggering
/// a fresh sync rather than hand-patching records.
pub struct PackageCacheStore {
    cache_dir: PathBuf,
    profiles: Mutex<HashMap<String, DeviceProfile>>,
}

pub fn default_cache_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("droidbridge")
        .join("device_profiles")
}

impl PackageCacheStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            let _ = fs::create_dir_all(&cache_dir);
        }

        let mut profiles = HashMap::new();
        if let Ok(entries) = fs::read_dir(&cache_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                match fs::read_to_string(&path)
                    .ok()
                    .and_then(|raw| serde_json::from_str::<DeviceProfile>(&raw).ok())
                {
                    Some(profile) => {
                        profiles.insert(profile.serial.clone(), profile);
                    }
                    None => {
                        warn!(path = %path.display(), "skipping unreadable device profile");
                    }
                }
            }
        }

        Self {
            cache_dir,
            profiles: Mutex::new(profiles),
        }
    }

    /// Cached packages for a device; returns instantly, never touches the
    /// bridge.
    pub fn get_packages(&self, serial: &str) -> Option<Vec<PackageRecord>> {
        let profiles = self.profiles.lock().expect("profile map poisoned");
        profiles.get(serial).map(|profile| profile.packages.clone())
    }

    pub fn last_sync(&self, serial: &str) -> Option<String> {
        let profiles = self.profiles.lock().expect("profile map poisoned");
        profiles.get(serial).map(|profile| profile.last_sync.clone())
    }

    /// Replaces the device profile and persists it. A `None` model keeps
    /// whatever model was recorded previously.
    pub fn update_profile(
        &self,
        serial: &str,
        packages: Vec<PackageRecord>,
        model: Option<String>,
    ) {
        let profile = {
            let mut profiles = self.profiles.lock().expect("profile map poisoned");
            let model = model.or_else(|| profiles.get(serial).and_then(|p| p.model.clone()));
            let profile = DeviceProfile {
                serial: serial.to_string(),
                model,
                last_sync: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
                packages,
            };
            profiles.insert(serial.to_string(), profile.clone());
            profile
        };
        self.persist(&profile);
    }

    /// Applies resolved labels in one pass; silently skips names that fell
    /// out of the profile between resolution and application.
    pub fn apply_labels(&self, serial: &str, labels: &[(String, String)]) {
        if labels.is_empty() {
            return;
        }
        let updated = {
            let mut profiles = self.profiles.lock().expect("profile map poisoned");
            let Some(profile) = profiles.get_mut(serial) else {
                return;
            };
            for (name, label) in labels {
                if let Some(record) = profile.packages.iter_mut().find(|r| &r.name == name) {
                    record.label = Some(label.clone());
                }
            }
            profile.clone()
        };
        self.persist(&updated);
    }

    /// Drops tombstoned records for a device. Explicit purge is the only way
    /// a record leaves the cache.
    pub fn purge_tombstones(&self, serial: &str) -> usize {
        let updated = {
            let mut profiles = self.profiles.lock().expect("profile map poisoned");
            let Some(profile) = profiles.get_mut(serial) else {
                return 0;
            };
            let before = profile.packages.len();
            profile.packages.retain(|record| !record.is_uninstalled);
            let purged = before - profile.packages.len();
            if purged == 0 {
                return 0;
            }
            (profile.clone(), purged)
        };
        self.persist(&updated.0);
        updated.1
    }

    fn persist(&self, profile: &DeviceProfile) {
        let path = self.profile_path(&profile.serial);
        match serde_json::to_string_pretty(profile) {
            Ok(json) => {
                if let Err(err) = fs::write(&path, json) {
                    warn!(serial = %profile.serial, error = %err, "failed to persist device profile");
                }
            }
            Err(err) => {
                warn!(serial = %profile.serial, error = %err, "failed to serialize device profile");
            }
        }
    }

    fn profile_path(&self, serial: &str) -> PathBuf {
        // Serials are shell-safe but keep path separators out anyway.
        let safe: String = serial
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.cache_dir.join(format!("{safe}.json"))
    }

    #[cfg(test)]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}
