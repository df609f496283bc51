pub mod parse;
pub mod runner;

use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use tracing::{info, warn};
use zip::write::FileOptions;

use crate::app::bridge::DeviceBridge;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::models::{BackupArchiveRecord, DeviceInfo, LifecycleAction, PackageRecord};
use parse::{
    build_package_records, parse_adb_devices, parse_application_label, parse_ls_size,
    parse_package_names, parse_pm_paths, parse_stat_size,
};
use runner::{run_command_with_timeout, CommandOutput};

pub const ARCHIVE_EXTENSION: &str = "adbk";

/// `DeviceBridge` over a real adb binary.
pub struct AdbBridge {
    program: String,
    timeout: Duration,
}

impl AdbBridge {
    pub fn new(config: &AppConfig) -> Self {
        let trimmed = config.adb_path.trim();
        let program = if trimmed.is_empty() {
            "adb".to_string()
        } else {
            trimmed.to_string()
        };
        Self {
            program,
            timeout: Duration::from_secs(config.device.command_timeout_secs),
        }
    }

    fn run(&self, args: &[String], trace_id: &str) -> Result<CommandOutput, AppError> {
        run_command_with_timeout(&self.program, args, self.timeout, trace_id)
    }

    /// Runs a command and folds the output into the error taxonomy: a
    /// non-zero exit is a device rejection, and shell commands that exit
    /// zero but print an error line (pm does this) are rejected too.
    fn run_checked(&self, args: &[String], trace_id: &str) -> Result<String, AppError> {
        let output = self.run(args, trace_id)?;
        if !output.succeeded() {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(AppError::device(
                format!("Bridge command failed: {detail}"),
                trace_id,
            ));
        }
        if let Some(problem) = shell_reported_error(args, &output.stdout) {
            return Err(AppError::device(
                format!("Device reported error: {problem}"),
                trace_id,
            ));
        }
        Ok(output.stdout)
    }

    /// Like `run_checked` but degrades to an empty string; used for the
    /// auxiliary `pm list` variants where a missing flag on old Android
    /// must not sink the whole listing.
    fn run_tolerant(&self, args: &[String], trace_id: &str) -> String {
        match self.run_checked(args, trace_id) {
            Ok(stdout) => stdout,
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "tolerated bridge command failure");
                String::new()
            }
        }
    }

    fn shell_args(serial: &str, tail: &[&str]) -> Vec<String> {
        let mut args = vec!["-s".to_string(), serial.to_string(), "shell".to_string()];
        args.extend(tail.iter().map(|s| s.to_string()));
        args
    }

    fn probe_root(&self, serial: &str, trace_id: &str) -> bool {
        match self.run(&Self::shell_args(serial, &["su", "-c", "id"]), trace_id) {
            Ok(output) => output.succeeded() && output.stdout.contains("uid=0"),
            Err(_) => false,
        }
    }

    fn pull(&self, serial: &str, remote: &str, local: &Path, trace_id: &str) -> Result<(), AppError> {
        let local = local.to_string_lossy().to_string();
        let args = vec![
            "-s".to_string(),
            serial.to_string(),
            "pull".to_string(),
            remote.to_string(),
            local,
        ];
        self.run_checked(&args, trace_id).map(|_| ())
    }

    fn push(&self, serial: &str, local: &Path, remote: &str, trace_id: &str) -> Result<(), AppError> {
        let local = local.to_string_lossy().to_string();
        let args = vec![
            "-s".to_string(),
            serial.to_string(),
            "push".to_string(),
            local,
            remote.to_string(),
        ];
        self.run_checked(&args, trace_id).map(|_| ())
    }

    /// Pulls every split APK of the package into `apks_dir`. Falls back to
    /// pulling just the recorded base APK when the directory listing fails.
    fn pull_apks(
        &self,
        serial: &str,
        package: &PackageRecord,
        apks_dir: &Path,
        trace_id: &str,
    ) -> Result<usize, AppError> {
        let install_path = package.install_path.as_deref().ok_or_else(|| {
            AppError::validation(
                format!("Package '{}' has no recorded install path", package.name),
                trace_id,
            )
        })?;

        let parent_dir = match install_path.rsplit_once('/') {
            Some((parent, _)) if !parent.is_empty() => parent.to_string(),
            _ => {
                return Err(AppError::validation(
                    format!("Unexpected install path '{install_path}'"),
                    trace_id,
                ))
            }
        };

        let listing = self.run_tolerant(&Self::shell_args(serial, &["ls", &parent_dir]), trace_id);
        let apk_files: Vec<&str> = listing
            .lines()
            .map(|line| line.trim())
            .filter(|line| line.ends_with(".apk"))
            .collect();

        if apk_files.is_empty() {
            self.pull(serial, install_path, &apks_dir.join("base.apk"), trace_id)?;
            return Ok(1);
        }
        for apk in &apk_files {
            let remote = format!("{parent_dir}/{apk}");
            self.pull(serial, &remote, &apks_dir.join(apk), trace_id)?;
        }
        Ok(apk_files.len())
    }

    /// Pulls the OBB payload directory when the package has one.
    fn pull_obb(&self, serial: &str, package_name: &str, staging: &Path, trace_id: &str) -> bool {
        let remote_obb = format!("/sdcard/Android/obb/{package_name}");
        let probe = self.run(&Self::shell_args(serial, &["ls", "-d", &remote_obb]), trace_id);
        let present = matches!(&probe, Ok(output) if output.succeeded()
            && !output.stdout.to_lowercase().contains("no such file"));
        if !present {
            return false;
        }
        let target = staging.join("obb");
        if target.exists() {
            let _ = fs::remove_dir_all(&target);
        }
        self.pull(serial, &remote_obb, &target, trace_id).is_ok()
    }

    /// Root-only: archives `/data/data/<pkg>` on device and pulls it.
    fn pull_app_data(&self, serial: &str, package_name: &str, staging: &Path, trace_id: &str) -> bool {
        if !self.probe_root(serial, trace_id) {
            return false;
        }
        let remote_tar = format!("/sdcard/droidbridge_{package_name}_data.tar.gz");
        let tar_cmd = format!("tar -czf {remote_tar} -C /data/data {package_name}");
        if self
            .run_checked(&Self::shell_args(serial, &["su", "-c", &tar_cmd]), trace_id)
            .is_err()
        {
            return false;
        }
        let local = staging.join("data.tar.gz");
        let pulled = self.pull(serial, &remote_tar, &local, trace_id).is_ok() && local.exists();
        let _ = self.run(&Self::shell_args(serial, &["rm", &remote_tar]), trace_id);
        pulled
    }

    fn install_apks(&self, serial: &str, apk_paths: &[PathBuf], trace_id: &str) -> Result<(), AppError> {
        let mut args = vec!["-s".to_string(), serial.to_string()];
        if apk_paths.len() == 1 {
            args.push("install".to_string());
            args.push("-r".to_string());
            args.push(apk_paths[0].to_string_lossy().to_string());
        } else {
            args.push("install-multiple".to_string());
            args.push("-r".to_string());
            args.extend(apk_paths.iter().map(|p| p.to_string_lossy().to_string()));
        }
        let stdout = self.run_checked(&args, trace_id)?;
        if !stdout.contains("Success") {
            return Err(AppError::device(
                format!("Install failed: {}", stdout.trim()),
                trace_id,
            ));
        }
        Ok(())
    }

    fn restore_obb(&self, serial: &str, obb_dir: &Path, package_name: &str, trace_id: &str) -> Result<(), AppError> {
        let target = format!("/sdcard/Android/obb/{package_name}/");
        let _ = self.run(&Self::shell_args(serial, &["mkdir", "-p", &target]), trace_id);
        for entry in fs::read_dir(obb_dir)
            .map_err(|err| AppError::system(format!("Failed to read obb dir: {err}"), trace_id))?
        {
            let entry =
                entry.map_err(|err| AppError::system(format!("obb entry: {err}"), trace_id))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            let remote = format!("{target}{file_name}");
            self.push(serial, &path, &remote, trace_id)?;
        }
        Ok(())
    }

    fn restore_app_data(&self, serial: &str, data_tar: &Path, package_name: &str, trace_id: &str) -> Result<(), AppError> {
        if !self.probe_root(serial, trace_id) {
            warn!(trace_id = %trace_id, package = %package_name, "skipping data restore, no root");
            return Ok(());
        }
        let remote_tar = "/sdcard/droidbridge_restore_data.tar.gz";
        self.push(serial, data_tar, remote_tar, trace_id)?;
        let extract = format!("tar -xzf {remote_tar} -C /data/data");
        self.run_checked(&Self::shell_args(serial, &["su", "-c", &extract]), trace_id)?;
        // Restored files belong to the shell user; hand them back to the app
        // and restore the SELinux context or Android refuses to load them.
        let chown = format!(
            "chown -R $(stat -c '%u:%g' /data/data/{0}/.) /data/data/{0}",
            package_name
        );
        let _ = self.run(&Self::shell_args(serial, &["su", "-c", &chown]), trace_id);
        let restorecon = format!("restorecon -R /data/data/{package_name}");
        let _ = self.run(&Self::shell_args(serial, &["su", "-c", &restorecon]), trace_id);
        let _ = self.run_checked(&Self::shell_args(serial, &["rm", remote_tar]), trace_id);
        Ok(())
    }
}

/// Shell commands frequently exit zero while printing an error; sniff the
/// common patterns. Plain `shell` invocations tolerate everything except an
/// explicit `error:` marker, matching how pm mixes warnings into stdout.
fn shell_reported_error(args: &[String], stdout: &str) -> Option<String> {
    let lower = stdout.to_lowercase();
    let is_shell = args.iter().any(|arg| arg == "shell");
    let suspicious = lower.contains("permission denied")
        || lower.contains("not found")
        || lower.contains("failed to")
        || lower.contains("error:");
    if !suspicious {
        return None;
    }
    if is_shell && !lower.contains("error:") {
        return None;
    }
    Some(stdout.trim().to_string())
}

fn archive_file_name(package_name: &str, timestamp: &str) -> String {
    format!("{package_name}_{timestamp}.{ARCHIVE_EXTENSION}")
}

/// Zips the staged backup layout (`apks/`, optional `obb/`, optional
/// `data.tar.gz`, `metadata.json`) into the destination archive.
fn write_archive(staging: &Path, dest: &Path, trace_id: &str) -> Result<u64, AppError> {
    let file = File::create(dest)
        .map_err(|err| AppError::system(format!("Failed to create archive: {err}"), trace_id))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Stored);

    let mut add_dir = |dir: &Path, prefix: &str| -> Result<(), AppError> {
        if !dir.exists() {
            return Ok(());
        }
        let entries = fs::read_dir(dir)
            .map_err(|err| AppError::system(format!("Failed to read staging: {err}"), trace_id))?;
        for entry in entries {
            let entry =
                entry.map_err(|err| AppError::system(format!("staging entry: {err}"), trace_id))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            zip.start_file(format!("{prefix}{name}"), options)
                .map_err(|err| AppError::system(format!("Failed to write archive: {err}"), trace_id))?;
            let mut source = File::open(&path)
                .map_err(|err| AppError::system(format!("Failed to open staged file: {err}"), trace_id))?;
            std::io::copy(&mut source, &mut zip)
                .map_err(|err| AppError::system(format!("Failed to write archive: {err}"), trace_id))?;
        }
        Ok(())
    };

    add_dir(&staging.join("apks"), "apks/")?;
    add_dir(&staging.join("obb"), "obb/")?;

    for loose in ["data.tar.gz", "metadata.json"] {
        let path = staging.join(loose);
        if !path.exists() {
            continue;
        }
        zip.start_file(loose, options)
            .map_err(|err| AppError::system(format!("Failed to write archive: {err}"), trace_id))?;
        let mut source = File::open(&path)
            .map_err(|err| AppError::system(format!("Failed to open staged file: {err}"), trace_id))?;
        std::io::copy(&mut source, &mut zip)
            .map_err(|err| AppError::system(format!("Failed to write archive: {err}"), trace_id))?;
    }

    zip.finish()
        .map_err(|err| AppError::system(format!("Failed to finalize archive: {err}"), trace_id))?;
    fs::metadata(dest)
        .map(|meta| meta.len())
        .map_err(|err| AppError::system(format!("Failed to stat archive: {err}"), trace_id))
}

#[derive(Debug)]
struct ArchiveManifest {
    package_name: String,
    has_data: bool,
}

fn read_manifest(dir: &Path) -> ArchiveManifest {
    let mut manifest = ArchiveManifest {
        package_name: String::new(),
        has_data: false,
    };
    let Ok(content) = fs::read_to_string(dir.join("metadata.json")) else {
        return manifest;
    };
    let Ok(json) = serde_json::from_str::<serde_json::Value>(&content) else {
        return manifest;
    };
    if let Some(name) = json["packageName"].as_str() {
        manifest.package_name = name.to_string();
    }
    manifest.has_data = json["hasData"].as_bool().unwrap_or(false);
    manifest
}

impl DeviceBridge for AdbBridge {
    fn list_devices(&self, trace_id: &str) -> Result<Vec<DeviceInfo>, AppError> {
        let args = vec!["devices".to_string(), "-l".to_string()];
        let stdout = self.run_checked(&args, trace_id)?;
        let mut devices = parse_adb_devices(&stdout);
        for device in devices.iter_mut() {
            if device.is_usable() {
                device.rooted = self.probe_root(&device.serial, trace_id);
            }
        }
        Ok(devices)
    }

    fn list_packages(&self, serial: &str, trace_id: &str) -> Result<Vec<PackageRecord>, AppError> {
        let installed = parse_package_names(
            &self.run_tolerant(&Self::shell_args(serial, &["pm", "list", "packages"]), trace_id),
        );
        let mut all = parse_package_names(
            &self.run_tolerant(&Self::shell_args(serial, &["pm", "list", "packages", "-u"]), trace_id),
        );
        if all.is_empty() {
            // Old builds without -u support; the installed set is all we get.
            all = installed.clone();
        }
        let system = parse_package_names(
            &self.run_tolerant(&Self::shell_args(serial, &["pm", "list", "packages", "-s"]), trace_id),
        );
        let disabled = parse_package_names(
            &self.run_tolerant(&Self::shell_args(serial, &["pm", "list", "packages", "-d"]), trace_id),
        );
        let paths = parse_pm_paths(
            &self.run_tolerant(&Self::shell_args(serial, &["pm", "list", "packages", "-f"]), trace_id),
        );

        let records = build_package_records(&all, &installed, &system, &disabled, &paths);
        if records.is_empty() {
            return Err(AppError::transport(
                "No packages reported; bridge unreachable or device locked",
                trace_id,
            ));
        }
        Ok(records)
    }

    fn resolve_label(
        &self,
        serial: &str,
        package: &str,
        trace_id: &str,
    ) -> Result<Option<String>, AppError> {
        // Needs an on-device aapt; absence simply means no label.
        let path_output = match self.run_checked(
            &Self::shell_args(serial, &["pm", "path", package]),
            trace_id,
        ) {
            Ok(stdout) => stdout,
            Err(err) if err.is_transport() => return Err(err),
            Err(_) => return Ok(None),
        };
        let Some(apk_path) = path_output
            .lines()
            .find_map(|line| line.trim().strip_prefix("package:"))
        else {
            return Ok(None);
        };
        match self.run(
            &Self::shell_args(serial, &["/system/bin/aapt", "dump", "badging", apk_path]),
            trace_id,
        ) {
            Ok(output) if output.succeeded() => Ok(parse_application_label(&output.stdout)),
            Ok(_) => Ok(None),
            Err(err) if err.is_transport() => Err(err),
            Err(_) => Ok(None),
        }
    }

    fn perform_backup(
        &self,
        serial: &str,
        package: &PackageRecord,
        dest_dir: &Path,
        trace_id: &str,
    ) -> Result<BackupArchiveRecord, AppError> {
        let staging = std::env::temp_dir()
            .join("droidbridge_staging")
            .join(&package.name);
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .map_err(|err| AppError::system(format!("Failed to clear staging: {err}"), trace_id))?;
        }
        let apks_dir = staging.join("apks");
        fs::create_dir_all(&apks_dir)
            .map_err(|err| AppError::system(format!("Failed to create staging: {err}"), trace_id))?;

        let apk_count = self.pull_apks(serial, package, &apks_dir, trace_id)?;
        let has_obb = self.pull_obb(serial, &package.name, &staging, trace_id);
        let has_data = self.pull_app_data(serial, &package.name, &staging, trace_id);

        let manifest = serde_json::json!({
            "packageName": package.name,
            "originalPath": package.install_path,
            "backupDate": Local::now().to_rfc3339(),
            "isSplit": apk_count > 1,
            "hasObb": has_obb,
            "hasData": has_data,
        });
        fs::write(staging.join("metadata.json"), manifest.to_string())
            .map_err(|err| AppError::system(format!("Failed to write manifest: {err}"), trace_id))?;

        fs::create_dir_all(dest_dir)
            .map_err(|err| AppError::system(format!("Failed to create backup dir: {err}"), trace_id))?;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let dest = dest_dir.join(archive_file_name(&package.name, &timestamp));
        let size_bytes = write_archive(&staging, &dest, trace_id)?;
        let _ = fs::remove_dir_all(&staging);

        info!(
            trace_id = %trace_id,
            package = %package.name,
            archive = %dest.display(),
            size_bytes,
            "backup archive created"
        );
        Ok(BackupArchiveRecord {
            name: dest
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            path: dest,
            size_bytes,
            created_at: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        })
    }

    fn perform_restore(
        &self,
        serial: &str,
        archive_path: &Path,
        trace_id: &str,
    ) -> Result<(), AppError> {
        if !archive_path.exists() {
            return Err(AppError::validation("Backup archive not found", trace_id));
        }
        let stem = archive_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown_backup".to_string());
        let extract_dir = std::env::temp_dir().join("droidbridge_restore").join(stem);
        if extract_dir.exists() {
            fs::remove_dir_all(&extract_dir)
                .map_err(|err| AppError::system(format!("Failed to clear extract dir: {err}"), trace_id))?;
        }
        fs::create_dir_all(&extract_dir)
            .map_err(|err| AppError::system(format!("Failed to create extract dir: {err}"), trace_id))?;

        let file = File::open(archive_path)
            .map_err(|err| AppError::system(format!("Failed to open archive: {err}"), trace_id))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|err| AppError::validation(format!("Not a backup archive: {err}"), trace_id))?;
        archive
            .extract(&extract_dir)
            .map_err(|err| AppError::system(format!("Failed to extract archive: {err}"), trace_id))?;

        let manifest = read_manifest(&extract_dir);

        let apks_dir = extract_dir.join("apks");
        let legacy_apk = extract_dir.join("base.apk");
        let apk_paths: Vec<PathBuf> = if apks_dir.exists() {
            let mut paths: Vec<PathBuf> = fs::read_dir(&apks_dir)
                .map_err(|err| AppError::system(format!("Failed to read apks dir: {err}"), trace_id))?
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "apk"))
                .collect();
            paths.sort();
            paths
        } else if legacy_apk.exists() {
            vec![legacy_apk]
        } else {
            Vec::new()
        };
        if apk_paths.is_empty() {
            return Err(AppError::validation(
                "Invalid backup archive: no APK payload",
                trace_id,
            ));
        }
        self.install_apks(serial, &apk_paths, trace_id)?;

        let obb_dir = extract_dir.join("obb");
        if obb_dir.exists() && !manifest.package_name.is_empty() {
            self.restore_obb(serial, &obb_dir, &manifest.package_name, trace_id)?;
        }

        let data_tar = extract_dir.join("data.tar.gz");
        if manifest.has_data && data_tar.exists() && !manifest.package_name.is_empty() {
            self.restore_app_data(serial, &data_tar, &manifest.package_name, trace_id)?;
        }

        let _ = fs::remove_dir_all(&extract_dir);
        Ok(())
    }

    fn delete_backup(&self, archive_path: &Path, trace_id: &str) -> Result<(), AppError> {
        if !archive_path.exists() {
            return Err(AppError::validation("Backup archive not found", trace_id));
        }
        fs::remove_file(archive_path)
            .map_err(|err| AppError::system(format!("Failed to delete archive: {err}"), trace_id))
    }

    fn apply_lifecycle_action(
        &self,
        serial: &str,
        package: &str,
        action: LifecycleAction,
        trace_id: &str,
    ) -> Result<(), AppError> {
        match action {
            LifecycleAction::Disable => self
                .run_checked(
                    &Self::shell_args(serial, &["pm", "disable-user", "--user", "0", package]),
                    trace_id,
                )
                .map(|_| ()),
            LifecycleAction::Enable => self
                .run_checked(
                    &Self::shell_args(serial, &["pm", "enable", "--user", "0", package]),
                    trace_id,
                )
                .map(|_| ()),
            LifecycleAction::Uninstall => self
                .run_checked(
                    &Self::shell_args(serial, &["pm", "uninstall", "-k", "--user", "0", package]),
                    trace_id,
                )
                .map(|_| ()),
            LifecycleAction::Reinstall => {
                // `cmd package` is the modern spelling; older builds only
                // accept the pm form.
                if self
                    .run_checked(
                        &Self::shell_args(serial, &["cmd", "package", "install-existing", package]),
                        trace_id,
                    )
                    .is_ok()
                {
                    return Ok(());
                }
                self.run_checked(
                    &Self::shell_args(serial, &["pm", "install-existing", package]),
                    trace_id,
                )
                .map(|_| ())
                .map_err(|err| {
                    AppError::device(
                        format!(
                            "Failed to reinstall '{package}'. Fully uninstalled user apps cannot \
                             be restored over the bridge: {}",
                            err.error
                        ),
                        trace_id,
                    )
                })
            }
        }
    }

    fn package_size(
        &self,
        serial: &str,
        package: &PackageRecord,
        trace_id: &str,
    ) -> Result<u64, AppError> {
        let path = package.install_path.as_deref().ok_or_else(|| {
            AppError::validation(
                format!("Package '{}' has no recorded install path", package.name),
                trace_id,
            )
        })?;
        if let Ok(output) = self.run_checked(
            &Self::shell_args(serial, &["stat", "-c", "%s", path]),
            trace_id,
        ) {
            if let Some(size) = parse_stat_size(&output) {
                return Ok(size);
            }
        }
        let ls_output = self.run_checked(&Self::shell_args(serial, &["ls", "-l", path]), trace_id)?;
        parse_ls_size(&ls_output)
            .ok_or_else(|| AppError::device("Could not determine package size", trace_id))
    }

    fn run_shell(
        &self,
        serial: Option<&str>,
        command: &str,
        trace_id: &str,
    ) -> Result<String, AppError> {
        let parts: Vec<&str> = command.split_whitespace().collect();
        if parts.is_empty() {
            return Err(AppError::validation("Empty command", trace_id));
        }
        let mut args = Vec::new();
        if let Some(serial) = serial {
            args.push("-s".to_string());
            args.push(serial.to_string());
        }
        // Accept both "adb shell ls" and "shell ls".
        let start = usize::from(parts[0] == "adb");
        args.extend(parts[start..].iter().map(|s| s.to_string()));
        self.run_checked(&args, trace_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell(parts: &[&str]) -> Vec<String> {
        AdbBridge::shell_args("SER", parts)
    }

    #[test]
    fn sniffs_shell_reported_errors() {
        let args = shell(&["pm", "uninstall", "com.x"]);
        assert!(shell_reported_error(&args, "Error: java.lang.SecurityException").is_some());
        // Warnings without an explicit error marker pass through for shell.
        assert!(shell_reported_error(&args, "Warning: not found in cache").is_none());
        // Non-shell commands are strict.
        let pull = vec!["pull".to_string(), "/a".to_string(), "/b".to_string()];
        assert!(shell_reported_error(&pull, "adb: failed to stat remote object").is_some());
        assert!(shell_reported_error(&pull, "1 file pulled").is_none());
    }

    #[test]
    fn archive_names_carry_package_and_timestamp() {
        assert_eq!(
            archive_file_name("com.example.app", "20260830_101500"),
            "com.example.app_20260830_101500.adbk"
        );
    }

    #[test]
    fn writes_and_reads_back_archive_layout() {
        let staging = TempDir::new().expect("staging");
        fs::create_dir_all(staging.path().join("apks")).expect("apks dir");
        fs::write(staging.path().join("apks/base.apk"), b"fake apk bytes").expect("apk");
        fs::write(
            staging.path().join("metadata.json"),
            r#"{"packageName":"com.example","hasData":true}"#,
        )
        .expect("manifest");
        fs::write(staging.path().join("data.tar.gz"), b"fake tar").expect("data");

        let out = TempDir::new().expect("out");
        let dest = out.path().join("com.example_x.adbk");
        let size = write_archive(staging.path(), &dest, "trace-zip").expect("archive");
        assert!(size > 0);

        let file = File::open(&dest).expect("open");
        let mut archive = zip::ZipArchive::new(file).expect("zip");
        assert!(archive.by_name("apks/base.apk").is_ok());
        assert!(archive.by_name("metadata.json").is_ok());
        assert!(archive.by_name("data.tar.gz").is_ok());
    }

    #[test]
    fn manifest_parsing_defaults_when_absent() {
        let dir = TempDir::new().expect("dir");
        let manifest = read_manifest(dir.path());
        assert!(manifest.package_name.is_empty());
        assert!(!manifest.has_data);

        fs::write(
            dir.path().join("metadata.json"),
            r#"{"packageName":"com.example","hasData":true}"#,
        )
        .expect("write");
        let manifest = read_manifest(dir.path());
        assert_eq!(manifest.package_name, "com.example");
        assert!(manifest.has_data);
    }
}
