//! Standalone process discovery for the `stop` subcommand.
//!
//! When the starter process is long gone there is no managed set to consult,
//! so stack processes are found two ways and the results are merged: by
//! command-line substring (catches dev servers whose ports never came up)
//! and by listening TCP port (catches processes whose command line the
//! patterns miss). The union is keyed by pid so nothing is terminated twice.

use std::collections::HashMap;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System, UpdateKind};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::process::manager::{ShutdownOutcome, ShutdownResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMatch {
    pub pid: u32,
    pub port: Option<u16>,
    pub process_name: String,
}

/// Enumerate OS processes and match their command lines case-insensitively
/// against the given substrings. One record per process, own pid excluded.
pub fn find_by_command_pattern(patterns: &[&str]) -> Vec<PortMatch> {
    let mut sys = System::new();
    // The default refresh does not fetch command lines; request them
    // explicitly or every `cmd()` below comes back empty.
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
    );

    let own_pid = std::process::id();
    let lowered: Vec<String> = patterns.iter().map(|p| p.to_lowercase()).collect();

    let mut matches = Vec::new();
    for (pid, process) in sys.processes() {
        if pid.as_u32() == own_pid {
            continue;
        }
        let cmdline = process
            .cmd()
            .iter()
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if cmdline.is_empty() {
            continue;
        }
        if lowered.iter().any(|p| cmdline.contains(p)) {
            matches.push(PortMatch {
                pid: pid.as_u32(),
                port: None,
                process_name: process.name().to_string_lossy().into_owned(),
            });
        }
    }
    matches.sort_by_key(|m| m.pid);
    matches
}

/// Resolve the owning pid of each listening TCP port. Own pid excluded.
pub async fn find_by_listening_port(ports: &[u16]) -> Vec<PortMatch> {
    let own_pid = std::process::id();
    let mut matches = Vec::new();

    for &port in ports {
        for pid in pids_listening_on(port).await {
            if pid == own_pid {
                continue;
            }
            matches.push(PortMatch {
                pid,
                port: Some(port),
                process_name: process_name(pid).unwrap_or_else(|| "unknown".to_string()),
            });
        }
    }
    matches.sort_by_key(|m| m.pid);
    matches
}

#[cfg(not(windows))]
async fn pids_listening_on(port: u16) -> Vec<u32> {
    let output = tokio::process::Command::new("lsof")
        .args(["-t", &format!("-iTCP:{}", port), "-sTCP:LISTEN"])
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .output()
        .await;

    match output {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse::<u32>().ok())
            .collect(),
        Err(e) => {
            debug!("lsof unavailable for port {}: {}", port, e);
            Vec::new()
        }
    }
}

#[cfg(windows)]
async fn pids_listening_on(port: u16) -> Vec<u32> {
    let output = tokio::process::Command::new("cmd")
        .args([
            "/C",
            &format!("netstat -ano | findstr :{} | findstr LISTENING", port),
        ])
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .output()
        .await;

    match output {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| {
                // TCP    0.0.0.0:5000    0.0.0.0:0    LISTENING    12345
                line.split_whitespace()
                    .last()
                    .and_then(|pid| pid.parse::<u32>().ok())
            })
            .filter(|pid| *pid > 0)
            .collect(),
        Err(e) => {
            debug!("netstat unavailable for port {}: {}", port, e);
            Vec::new()
        }
    }
}

fn process_name(pid: u32) -> Option<String> {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    sys.process(Pid::from_u32(pid))
        .map(|p| p.name().to_string_lossy().into_owned())
}

/// Union of both discovery passes, keyed by pid. The first record for a pid
/// wins; a later record only contributes its port if the first had none.
pub fn merge(primary: Vec<PortMatch>, secondary: Vec<PortMatch>) -> Vec<PortMatch> {
    let mut by_pid: HashMap<u32, PortMatch> = HashMap::new();
    let mut order = Vec::new();

    for m in primary.into_iter().chain(secondary) {
        match by_pid.get_mut(&m.pid) {
            Some(existing) => {
                if existing.port.is_none() {
                    existing.port = m.port;
                }
            }
            None => {
                order.push(m.pid);
                by_pid.insert(m.pid, m);
            }
        }
    }

    let mut merged: Vec<PortMatch> = order
        .into_iter()
        .filter_map(|pid| by_pid.remove(&pid))
        .collect();
    merged.sort_by_key(|m| m.pid);
    merged
}

/// Send SIGTERM (or the closest platform equivalent) to a pid.
/// Returns false if the process was not found or the signal failed.
pub fn signal_term(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    match sys.process(Pid::from_u32(pid)) {
        Some(process) => process
            .kill_with(Signal::Term)
            .unwrap_or_else(|| process.kill()),
        None => false,
    }
}

/// Forcefully kill a pid. Returns false if it was already gone.
pub fn force_kill(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    match sys.process(Pid::from_u32(pid)) {
        Some(process) => process.kill(),
        None => false,
    }
}

/// A zombie still appears in the process table; treat it as exited.
pub fn is_alive(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    match sys.process(Pid::from_u32(pid)) {
        Some(process) => !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
        None => false,
    }
}

/// Poll until the pid is gone or the timeout expires.
pub async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if !is_alive(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(200)).await;
    }
}

/// Terminate every match: graceful signal, bounded wait, then forced kill.
/// Failures are captured per process, never propagated.
pub async fn terminate_all(matches: &[PortMatch], grace: Duration) -> Vec<ShutdownResult> {
    let mut results = Vec::with_capacity(matches.len());

    for m in matches {
        let label = match m.port {
            Some(port) => format!("{} (pid {}, port {})", m.process_name, m.pid, port),
            None => format!("{} (pid {})", m.process_name, m.pid),
        };

        if !is_alive(m.pid) {
            results.push(ShutdownResult {
                name: label,
                outcome: ShutdownOutcome::AlreadyStopped,
                detail: None,
            });
            continue;
        }

        info!("stopping {}", label);
        if !signal_term(m.pid) {
            // Process vanished between the check and the signal, or the
            // signal was refused (access denied on another user's process).
            let outcome = if is_alive(m.pid) {
                ShutdownOutcome::Failed
            } else {
                ShutdownOutcome::AlreadyStopped
            };
            results.push(ShutdownResult {
                name: label,
                outcome,
                detail: Some("termination signal not delivered".to_string()),
            });
            continue;
        }

        if wait_for_exit(m.pid, grace).await {
            results.push(ShutdownResult {
                name: label,
                outcome: ShutdownOutcome::Terminated,
                detail: None,
            });
        } else {
            warn!("{} did not exit within {:?}, force killing", label, grace);
            force_kill(m.pid);
            let outcome = if wait_for_exit(m.pid, Duration::from_secs(2)).await {
                ShutdownOutcome::ForceKilled
            } else {
                ShutdownOutcome::Failed
            };
            results.push(ShutdownResult {
                name: label,
                outcome,
                detail: (outcome == ShutdownOutcome::Failed)
                    .then(|| "still running after forced kill".to_string()),
            });
        }
    }

    results
}
