use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::app::models::{DeviceInfo, PackageRecord};

// `ls -l` prints timestamps that parse as integers too; anything below this is
// not a plausible APK size.
const MIN_VALID_APK_SIZE: u64 = 1024;

pub fn parse_adb_devices(output: &str) -> Vec<DeviceInfo> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with('*'))
        .filter(|line| !line.to_lowercase().contains("list of devices"))
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 2 {
                return None;
            }
            let serial = tokens[0].to_string();
            let state = tokens[1].to_string();
            let model = tokens
                .iter()
                .skip(2)
                .find_map(|token| token.strip_prefix("model:"))
                .map(|value| value.replace('_', " "));
            let authorized = state == "device";
            Some(DeviceInfo {
                serial,
                state,
                model,
                authorized,
                rooted: false,
            })
        })
        .collect()
}

/// Package names from any `pm list packages` variant.
pub fn parse_package_names(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// `pm list packages -f` lines: `package:<apk path>=<name>`.
pub fn parse_pm_paths(output: &str) -> HashMap<String, String> {
    let mut paths = HashMap::new();
    for line in output.lines() {
        let Some(payload) = line.trim().strip_prefix("package:") else {
            continue;
        };
        if let Some((apk_path, name)) = payload.rsplit_once('=') {
            let name = name.trim();
            if !name.is_empty() {
                paths.insert(name.to_string(), apk_path.trim().to_string());
            }
        }
    }
    paths
}

/// Combines the `pm list packages` set algebra into package records:
/// `all` is the `-u` listing (tombstones included), `installed` the plain
/// listing, `system` the `-s` listing, `disabled` the `-d` listing, and
/// `paths` the `-f` mapping. Output is sorted by name.
pub fn build_package_records(
    all: &HashSet<String>,
    installed: &HashSet<String>,
    system: &HashSet<String>,
    disabled: &HashSet<String>,
    paths: &HashMap<String, String>,
) -> Vec<PackageRecord> {
    let mut records: Vec<PackageRecord> = all
        .iter()
        .map(|name| PackageRecord {
            name: name.clone(),
            install_path: paths.get(name).cloned(),
            is_system: system.contains(name),
            is_disabled: disabled.contains(name),
            is_uninstalled: !installed.contains(name),
            label: None,
        })
        .collect();
    records.sort_by(|a, b| a.name.cmp(&b.name));
    records
}

/// `stat -c %s <path>` gives the size as a bare number.
pub fn parse_stat_size(output: &str) -> Option<u64> {
    output.trim().parse::<u64>().ok()
}

/// Fallback for devices without `stat`: scan `ls -l` tokens for the first
/// integer that plausibly is a file size.
pub fn parse_ls_size(output: &str) -> Option<u64> {
    output
        .split_whitespace()
        .filter_map(|token| token.parse::<u64>().ok())
        .find(|size| *size > MIN_VALID_APK_SIZE)
}

/// Application label out of `aapt dump badging` output, e.g.
/// `application-label:'Calendar'` or a localized `application-label-en:'...'`.
pub fn parse_application_label(output: &str) -> Option<String> {
    let re = Regex::new(r"application-label(?:-[A-Za-z\-]+)?:'([^']+)'").ok()?;
    for line in output.lines() {
        if let Some(caps) = re.captures(line.trim()) {
            let label = caps[1].trim().to_string();
            if !label.is_empty() {
                return Some(label);
            }
        }
    }
    None
}
