use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::warn;

use crate::app::adb::ARCHIVE_EXTENSION;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::models::BackupArchiveRecord;

/// Where archives live: the configured backup path, else the platform
/// download directory, else the working directory.
pub fn backup_directory(config: &AppConfig) -> PathBuf {
    if let Some(path) = &config.backup.backup_path {
        return PathBuf::from(path);
    }
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Lists backup archives in `dir`, newest first. A directory that does not
/// exist yet is an empty library, not an error; individual unreadable
/// entries are skipped with a warning.
pub fn list_archives(dir: &Path, trace_id: &str) -> Result<Vec<BackupArchiveRecord>, AppError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|err| {
        AppError::system(format!("Failed to read backup directory: {err}"), trace_id)
    })?;

    let mut archives = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(ARCHIVE_EXTENSION) {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(trace_id = %trace_id, path = %path.display(), error = %err, "skipping unreadable archive");
                continue;
            }
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        archives.push((modified, BackupArchiveRecord {
            path: path.clone(),
            name,
            size_bytes: metadata.len(),
            created_at: DateTime::<Local>::from(modified)
                .format("%Y-%m-%dT%H:%M:%S")
                .to_string(),
        }));
    }

    archives.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
    Ok(archives.into_iter().map(|(_, record)| record).collect())
}
