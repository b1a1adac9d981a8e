//! Per-service pidfiles under `<project-dir>/.healthstack/`.
//!
//! The starter records each child's pid at launch so a later `stop`
//! invocation can terminate exactly the processes it started, without
//! resorting to command-line pattern matching. Scanning remains the
//! fallback for pids the files no longer cover.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

fn pidfile_path(run_dir: &Path, service: &str) -> PathBuf {
    run_dir.join(format!("{}.pid", service))
}

/// Record a launched service's pid. Creates the run directory on demand.
pub fn write_pidfile(run_dir: &Path, service: &str, pid: u32) -> io::Result<()> {
    fs::create_dir_all(run_dir)?;
    fs::write(pidfile_path(run_dir, service), pid.to_string())
}

/// Remove one service's pidfile; missing files are not an error.
pub fn remove_pidfile(run_dir: &Path, service: &str) {
    let path = pidfile_path(run_dir, service);
    if let Err(e) = fs::remove_file(&path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("could not remove {}: {}", path.display(), e);
        }
    }
}

/// Read all recorded (service, pid) pairs. Unparseable files are skipped
/// with a warning rather than failing the stop path.
pub fn read_pidfiles(run_dir: &Path) -> Vec<(String, u32)> {
    let entries = match fs::read_dir(run_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut pids = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("pid") {
            continue;
        }
        let service = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s.to_string(),
            None => continue,
        };
        match fs::read_to_string(&path).map(|s| s.trim().parse::<u32>()) {
            Ok(Ok(pid)) => pids.push((service, pid)),
            _ => warn!("ignoring unreadable pidfile {}", path.display()),
        }
    }
    pids.sort();
    pids
}
