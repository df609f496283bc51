use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationSettings {
    pub notifications_enabled: bool,
    pub sound_enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            sound_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BackupSettings {
    /// None means "use the platform default download directory".
    pub backup_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSettings {
    pub poll_interval_secs: u64,
    pub command_timeout_secs: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
            command_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelSettings {
    pub batch_size: usize,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self { batch_size: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub backup: BackupSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub labels: LabelSettings,
    #[serde(default)]
    pub adb_path: String,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("DROIDBRIDGE_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".droidbridge_config.json")
}

pub fn backup_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".droidbridge_config.backup.json")
}

pub fn load_config() -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path())
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    save_config_to_path(config, &config_path(), &backup_config_path())
}

pub fn load_config_from_path(path: &Path) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), ""))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), ""))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), ""))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), ""))?;
    Ok(())
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    if config.device.poll_interval_secs == 0 {
        config.device.poll_interval_secs = 3;
    }
    if config.device.command_timeout_secs == 0 {
        config.device.command_timeout_secs = 30;
    }
    if config.labels.batch_size == 0 {
        config.labels.batch_size = 10;
    }
    if let Some(path) = &config.backup.backup_path {
        if path.trim().is_empty() {
            config.backup.backup_path = None;
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().expect("tmp");
        let config = load_config_from_path(&dir.path().join("none.json")).expect("config");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.device.poll_interval_secs, 3);
        assert_eq!(config.labels.batch_size, 10);
    }

    #[test]
    fn clamps_invalid_values() {
        let config = AppConfig {
            device: DeviceSettings {
                poll_interval_secs: 0,
                command_timeout_secs: 0,
            },
            labels: LabelSettings { batch_size: 0 },
            backup: BackupSettings {
                backup_path: Some("   ".to_string()),
            },
            ..AppConfig::default()
        };
        let validated = validate_config(config);
        assert_eq!(validated.device.poll_interval_secs, 3);
        assert_eq!(validated.device.command_timeout_secs, 30);
        assert_eq!(validated.labels.batch_size, 10);
        assert_eq!(validated.backup.backup_path, None);
    }

    #[test]
    fn round_trips_through_disk_and_keeps_backup_copy() {
        let dir = TempDir::new().expect("tmp");
        let path = dir.path().join("config.json");
        let backup = dir.path().join("config.backup.json");

        let mut config = AppConfig::default();
        config.notifications.sound_enabled = false;
        config.backup.backup_path = Some("/tmp/backups".to_string());
        save_config_to_path(&config, &path, &backup).expect("save");
        // A second save snapshots the previous file.
        save_config_to_path(&config, &path, &backup).expect("save again");
        assert!(backup.exists());

        let loaded = load_config_from_path(&path).expect("load");
        assert!(!loaded.notifications.sound_enabled);
        assert_eq!(loaded.backup.backup_path.as_deref(), Some("/tmp/backups"));
    }

    #[test]
    fn partial_config_fills_missing_sections() {
        let dir = TempDir::new().expect("tmp");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"notifications":{"notifications_enabled":false,"sound_enabled":true}}"#)
            .expect("write");
        let loaded = load_config_from_path(&path).expect("load");
        assert!(!loaded.notifications.notifications_enabled);
        assert_eq!(loaded.device.poll_interval_secs, 3);
    }
}
