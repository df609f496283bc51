use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use droidbridge::app::adb::AdbBridge;
use droidbridge::app::archives::{backup_directory, list_archives};
use droidbridge::app::bridge::DeviceBridge;
use droidbridge::app::config::load_config;
use droidbridge::app::logging::init_logging;
use droidbridge::app::store::PackageCacheStore;
use droidbridge::app::sync::PackageSyncEngine;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    serial: Option<String>,
    out_dir: Option<PathBuf>,
    json: bool,
    with_backup: bool,
    with_restore: bool,
    package: Option<String>,
}

#[derive(Serialize)]
struct SmokeSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    serial: Option<String>,
    out_dir: String,
    artifacts: HashMap<String, String>,
    checks: Vec<SmokeCheck>,
}

#[derive(Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: &'static str, // pass|fail|warn|skip
    duration_ms: u128,
    artifacts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut out_dir: Option<PathBuf> = None;
    let mut json = false;
    let mut with_backup = false;
    let mut with_restore = false;
    let mut package: Option<String> = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--out" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--out requires a value".to_string())?;
                out_dir = Some(PathBuf::from(value));
            }
            "--json" => {
                json = true;
            }
            "--with-backup" => {
                with_backup = true;
            }
            "--with-restore" => {
                with_restore = true;
            }
            "--package" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--package requires a value".to_string())?;
                package = Some(value);
            }
            "-h" | "--help" => {
                return Err(
                    "Usage: cargo run --bin smoke -- [--serial SERIAL] [--out DIR] [--json] [--with-backup] [--with-restore] [--package NAME]\n"
                        .to_string(),
                );
            }
            other => return Err(format!("Unknown arg: {other}")),
        }
    }

    if with_restore && !with_backup {
        return Err("--with-restore requires --with-backup".to_string());
    }
    if with_backup && package.is_none() {
        return Err("--with-backup requires --package".to_string());
    }

    Ok(Args {
        serial,
        out_dir,
        json,
        with_backup,
        with_restore,
        package,
    })
}

fn ensure_dir(path: &Path) -> Result<(), String> {
    fs::create_dir_all(path)
        .map_err(|err| format!("Failed to create dir {}: {err}", path.display()))
}

fn pick_single_device(bridge: &AdbBridge, trace_id: &str) -> Result<String, String> {
    let devices = bridge.list_devices(trace_id).map_err(|err| err.to_string())?;
    let usable: Vec<_> = devices.into_iter().filter(|d| d.is_usable()).collect();
    if usable.is_empty() {
        return Err("No usable adb devices found.".to_string());
    }
    if usable.len() > 1 {
        let serials = usable
            .into_iter()
            .map(|d| d.serial)
            .collect::<Vec<_>>()
            .join(", ");
        return Err(format!(
            "Multiple usable devices found ({serials}). Set ANDROID_SERIAL or pass --serial."
        ));
    }
    Ok(usable[0].serial.clone())
}

fn run_check<F>(checks: &mut Vec<SmokeCheck>, name: &'static str, f: F) -> Result<(), ()>
where
    F: FnOnce() -> Result<
        (Vec<String>, Option<&'static str>, Option<String>),
        (&'static str, String),
    >,
{
    let start = Instant::now();
    match f() {
        Ok((artifacts, error_code, error)) => {
            checks.push(SmokeCheck {
                name,
                status: if error_code.is_some() || error.is_some() {
                    "warn"
                } else {
                    "pass"
                },
                duration_ms: start.elapsed().as_millis(),
                artifacts,
                error_code,
                error,
            });
            Ok(())
        }
        Err((code, err)) => {
            checks.push(SmokeCheck {
                name,
                status: "fail",
                duration_ms: start.elapsed().as_millis(),
                artifacts: vec![],
                error_code: Some(code),
                error: Some(err),
            });
            Err(())
        }
    }
}

fn run_warn<F>(checks: &mut Vec<SmokeCheck>, name: &'static str, f: F)
where
    F: FnOnce() -> Result<(Vec<String>, Option<String>), (&'static str, String)>,
{
    let start = Instant::now();
    match f() {
        Ok((artifacts, warning)) => {
            checks.push(SmokeCheck {
                name,
                status: if warning.is_some() { "warn" } else { "pass" },
                duration_ms: start.elapsed().as_millis(),
                artifacts,
                error_code: warning.as_ref().map(|_| "WARN"),
                error: warning,
            });
        }
        Err((code, err)) => {
            checks.push(SmokeCheck {
                name,
                status: "warn",
                duration_ms: start.elapsed().as_millis(),
                artifacts: vec![],
                error_code: Some(code),
                error: Some(err),
            });
        }
    }
}

fn skip(checks: &mut Vec<SmokeCheck>, name: &'static str) {
    checks.push(SmokeCheck {
        name,
        status: "skip",
        duration_ms: 0,
        artifacts: vec![],
        error_code: None,
        error: None,
    });
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    init_logging();
    let trace_id = Uuid::new_v4().to_string();

    let out_dir = args.out_dir.clone().unwrap_or_else(|| {
        let mut p = std::env::temp_dir();
        p.push(format!("droidbridge_smoke_{trace_id}"));
        p
    });
    if let Err(err) = ensure_dir(&out_dir) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    let mut artifacts: HashMap<String, String> = HashMap::new();
    let mut checks: Vec<SmokeCheck> = Vec::new();
    let mut status = "pass";

    let config = match load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            checks.push(SmokeCheck {
                name: "load_config",
                status: "fail",
                duration_ms: 0,
                artifacts: vec![],
                error_code: Some("ERR_CONFIG"),
                error: Some(err.to_string()),
            });
            let summary = SmokeSummary {
                tool: "droidbridge_smoke",
                status: "fail",
                trace_id,
                serial: args.serial,
                out_dir: out_dir.to_string_lossy().to_string(),
                artifacts,
                checks,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).unwrap_or_default()
            );
            std::process::exit(1);
        }
    };
    let bridge = Arc::new(AdbBridge::new(&config));

    // adb itself reachable (real command).
    if run_check(&mut checks, "adb_version", || {
        let output = bridge
            .run_shell(None, "version", &trace_id)
            .map_err(|err| ("ERR_ADB_VERSION", err.to_string()))?;
        let path = out_dir.join("adb_version.txt");
        fs::write(&path, &output)
            .map_err(|err| ("ERR_IO", format!("Failed to write adb version: {err}")))?;
        artifacts.insert("adb_version".to_string(), path.to_string_lossy().to_string());
        Ok((vec![path.to_string_lossy().to_string()], None, None))
    })
    .is_err()
    {
        status = "fail";
    }

    // Device roster.
    if run_check(&mut checks, "list_devices", || {
        let devices = bridge
            .list_devices(&trace_id)
            .map_err(|err| ("ERR_LIST_DEVICES", err.to_string()))?;
        let path = out_dir.join("devices.json");
        let body = serde_json::to_string_pretty(&devices)
            .map_err(|err| ("ERR_IO", format!("Failed to serialize devices: {err}")))?;
        fs::write(&path, body)
            .map_err(|err| ("ERR_IO", format!("Failed to write devices: {err}")))?;
        artifacts.insert("devices".to_string(), path.to_string_lossy().to_string());
        Ok((vec![path.to_string_lossy().to_string()], None, None))
    })
    .is_err()
    {
        status = "fail";
    }

    let serial = match args.serial.clone() {
        Some(s) => s,
        None => match pick_single_device(&bridge, &trace_id) {
            Ok(s) => s,
            Err(err) => {
                checks.push(SmokeCheck {
                    name: "pick_device",
                    status: "fail",
                    duration_ms: 0,
                    artifacts: vec![],
                    error_code: Some("ERR_PICK_DEVICE"),
                    error: Some(err),
                });
                let summary = SmokeSummary {
                    tool: "droidbridge_smoke",
                    status: "fail",
                    trace_id,
                    serial: None,
                    out_dir: out_dir.to_string_lossy().to_string(),
                    artifacts,
                    checks,
                };
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summary).unwrap_or_default()
                );
                std::process::exit(1);
            }
        },
    };

    // Full package sync against a throwaway cache.
    let store = Arc::new(PackageCacheStore::new(&out_dir.join("cache")));
    let engine = PackageSyncEngine::new(
        Arc::clone(&bridge) as Arc<dyn DeviceBridge>,
        Arc::clone(&store),
    );
    if run_check(&mut checks, "sync_packages", || {
        let result = engine
            .sync(&serial, &trace_id)
            .map_err(|err| ("ERR_SYNC", err.to_string()))?;
        if result.total == 0 {
            return Err(("ERR_SYNC_EMPTY", "Device reported zero packages".to_string()));
        }
        let packages = engine.load(&serial).unwrap_or_default();
        let path = out_dir.join("packages.json");
        let body = serde_json::to_string_pretty(&packages)
            .map_err(|err| ("ERR_IO", format!("Failed to serialize packages: {err}")))?;
        fs::write(&path, body)
            .map_err(|err| ("ERR_IO", format!("Failed to write packages: {err}")))?;
        artifacts.insert("packages".to_string(), path.to_string_lossy().to_string());
        Ok((vec![path.to_string_lossy().to_string()], None, None))
    })
    .is_err()
    {
        status = "fail";
    }

    // Label resolution for one package (aapt may be absent on the device).
    run_warn(&mut checks, "resolve_label", || {
        let packages = engine.load(&serial).unwrap_or_default();
        let candidate = packages
            .iter()
            .find(|p| !p.is_system && !p.is_uninstalled)
            .or_else(|| packages.iter().find(|p| !p.is_uninstalled));
        let Some(package) = candidate else {
            return Ok((vec![], Some("No installed package to label.".to_string())));
        };
        let label = bridge
            .resolve_label(&serial, &package.name, &trace_id)
            .map_err(|err| ("WARN_LABEL", err.to_string()))?;
        match label {
            Some(label) => {
                let path = out_dir.join("label.txt");
                fs::write(&path, format!("{} = {label}\n", package.name))
                    .map_err(|err| ("WARN_LABEL", format!("Failed to write label: {err}")))?;
                artifacts.insert("label".to_string(), path.to_string_lossy().to_string());
                Ok((vec![path.to_string_lossy().to_string()], None))
            }
            None => Ok((
                vec![],
                Some(format!("No label resolved for {}.", package.name)),
            )),
        }
    });

    // Size lookup for the same package (stat may be restricted).
    run_warn(&mut checks, "package_size", || {
        let packages = engine.load(&serial).unwrap_or_default();
        let Some(package) = packages.iter().find(|p| p.install_path.is_some()) else {
            return Ok((vec![], Some("No package with a known path.".to_string())));
        };
        match bridge.package_size(&serial, package, &trace_id) {
            Ok(size) => {
                let path = out_dir.join("package_size.txt");
                fs::write(&path, format!("{} = {size} bytes\n", package.name))
                    .map_err(|err| ("WARN_SIZE", format!("Failed to write size: {err}")))?;
                artifacts.insert("package_size".to_string(), path.to_string_lossy().to_string());
                Ok((vec![path.to_string_lossy().to_string()], None))
            }
            Err(err) => Ok((vec![], Some(err.to_string()))),
        }
    });

    // Archive library listing (host-side only).
    if run_check(&mut checks, "list_archives", || {
        let dir = backup_directory(&config);
        let records = list_archives(&dir, &trace_id)
            .map_err(|err| ("ERR_ARCHIVES", err.to_string()))?;
        let path = out_dir.join("archives.json");
        let body = serde_json::to_string_pretty(&records)
            .map_err(|err| ("ERR_IO", format!("Failed to serialize archives: {err}")))?;
        fs::write(&path, body)
            .map_err(|err| ("ERR_IO", format!("Failed to write archives: {err}")))?;
        artifacts.insert("archives".to_string(), path.to_string_lossy().to_string());
        Ok((vec![path.to_string_lossy().to_string()], None, None))
    })
    .is_err()
    {
        status = "fail";
    }

    // Optional backup (and restore) round trip against a named package.
    if args.with_backup {
        let mut archive_path: Option<PathBuf> = None;
        if run_check(&mut checks, "backup_package", || {
            let name = args.package.clone().unwrap_or_default();
            let packages = engine.load(&serial).unwrap_or_default();
            let record = packages
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| ("ERR_BACKUP", format!("Package {name} not in cache")))?;
            let archive = bridge
                .perform_backup(&serial, record, &out_dir, &trace_id)
                .map_err(|err| ("ERR_BACKUP", err.to_string()))?;
            artifacts.insert("backup".to_string(), archive.path.to_string_lossy().to_string());
            archive_path = Some(archive.path.clone());
            Ok((vec![archive.path.to_string_lossy().to_string()], None, None))
        })
        .is_err()
        {
            status = "fail";
        }

        if args.with_restore {
            if let Some(path) = archive_path {
                if run_check(&mut checks, "restore_package", || {
                    bridge
                        .perform_restore(&serial, &path, &trace_id)
                        .map_err(|err| ("ERR_RESTORE", err.to_string()))?;
                    Ok((vec![], None, None))
                })
                .is_err()
                {
                    status = "fail";
                }
            } else {
                skip(&mut checks, "restore_package");
            }
        } else {
            skip(&mut checks, "restore_package");
        }
    } else {
        skip(&mut checks, "backup_package");
        skip(&mut checks, "restore_package");
    }

    let summary = SmokeSummary {
        tool: "droidbridge_smoke",
        status,
        trace_id: trace_id.clone(),
        serial: Some(serial),
        out_dir: out_dir.to_string_lossy().to_string(),
        artifacts,
        checks,
    };

    let output = if args.json {
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
    } else {
        format!(
            "status: {}\ntrace_id: {}\nout: {}\n",
            summary.status, summary.trace_id, summary.out_dir
        )
    };

    println!("{output}");
    if summary.status != "pass" {
        std::process::exit(1);
    }
}
