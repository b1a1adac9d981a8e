use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::{info, warn};

use crate::config::{
    ReadyProbe, ServiceDescriptor, Tier, GRACEFUL_TERM_TIMEOUT_SECS, READY_POLL_INITIAL_MS,
    READY_POLL_MAX_MS,
};
use crate::error::SupervisorError;
use crate::pidfile;
use crate::process::port::{check_http_health, is_port_in_use};
use crate::process::scanner;

/// A child process whose lifecycle the supervisor tracks. At most one
/// managed process exists per service name.
pub struct ManagedProcess {
    pub name: String,
    pub child: Child,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Terminated,
    ForceKilled,
    AlreadyStopped,
    Failed,
}

impl fmt::Display for ShutdownOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShutdownOutcome::Terminated => "terminated",
            ShutdownOutcome::ForceKilled => "force killed",
            ShutdownOutcome::AlreadyStopped => "already stopped",
            ShutdownOutcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownResult {
    pub name: String,
    pub outcome: ShutdownOutcome,
    pub detail: Option<String>,
}

impl ShutdownResult {
    pub fn succeeded(&self) -> bool {
        self.outcome != ShutdownOutcome::Failed
    }
}

/// Owns the managed-process set. All mutation goes through these methods;
/// the signal handler calls `stop_all`, it never touches the set directly.
pub struct Supervisor {
    run_dir: PathBuf,
    managed: Mutex<Vec<ManagedProcess>>,
    // Flipped by `stop_all` and never cleared: once shutdown has begun,
    // in-flight and future launches abort instead of racing the drain.
    shutdown_started: AtomicBool,
    http: reqwest::Client,
}

impl Supervisor {
    pub fn new(run_dir: PathBuf) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap_or_default();
        Self {
            run_dir,
            managed: Mutex::new(Vec::new()),
            shutdown_started: AtomicBool::new(false),
            http,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_started.load(Ordering::SeqCst)
    }

    pub async fn managed_names(&self) -> Vec<String> {
        self.managed.lock().await.iter().map(|m| m.name.clone()).collect()
    }

    pub async fn is_managed(&self, name: &str) -> bool {
        self.managed.lock().await.iter().any(|m| m.name == name)
    }

    /// True while at least one managed child has not exited.
    pub async fn any_running(&self) -> bool {
        let mut managed = self.managed.lock().await;
        for entry in managed.iter_mut() {
            if matches!(entry.child.try_wait(), Ok(None)) {
                return true;
            }
        }
        false
    }

    /// Spawn one service and wait for it to become ready. The child is
    /// registered (and its pidfile written) before the readiness wait, so a
    /// later `stop_all` cleans it up even if readiness times out.
    pub async fn launch(&self, descriptor: &ServiceDescriptor) -> Result<(), SupervisorError> {
        if self.is_shutting_down() {
            return Err(SupervisorError::Interrupted {
                service: descriptor.name.to_string(),
            });
        }
        if self.is_managed(descriptor.name).await {
            return Err(SupervisorError::AlreadyRunning {
                service: descriptor.name.to_string(),
            });
        }

        info!(
            "starting {} ({} {})",
            descriptor.name,
            descriptor.program,
            descriptor.args.join(" ")
        );

        let mut child = spawn_command(descriptor)
            .map_err(|e| SupervisorError::launch(descriptor.name, e.to_string()))?;
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            let _ = crate::logs::spawn_stdout_reader(descriptor.name, stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            let _ = crate::logs::spawn_stderr_reader(descriptor.name, stderr);
        }

        if let Some(pid) = pid {
            if let Err(e) = pidfile::write_pidfile(&self.run_dir, descriptor.name, pid) {
                warn!("could not write pidfile for {}: {}", descriptor.name, e);
            }
        }

        {
            // Same lock `stop_all` drains under: either the drain sees this
            // entry, or the flag is already set and the child dies here.
            let mut managed = self.managed.lock().await;
            if self.is_shutting_down() {
                drop(managed);
                pidfile::remove_pidfile(&self.run_dir, descriptor.name);
                let _ = child.kill().await;
                let _ = child.wait().await;
                return Err(SupervisorError::Interrupted {
                    service: descriptor.name.to_string(),
                });
            }
            managed.push(ManagedProcess {
                name: descriptor.name.to_string(),
                child,
                pid,
                started_at: Utc::now(),
            });
        }

        self.wait_until_ready(descriptor).await?;
        info!("{} is ready (pid {:?})", descriptor.name, pid);
        Ok(())
    }

    /// Poll the descriptor's readiness probe with exponential backoff while
    /// watching for the child exiting underneath us.
    async fn wait_until_ready(&self, descriptor: &ServiceDescriptor) -> Result<(), SupervisorError> {
        let deadline = Instant::now() + descriptor.ready_timeout;
        let mut interval = Duration::from_millis(READY_POLL_INITIAL_MS);
        let max_interval = Duration::from_millis(READY_POLL_MAX_MS);

        loop {
            // A shutdown that began mid-poll has already drained and reaped
            // the child; stop waiting for it.
            if self.is_shutting_down() {
                return Err(SupervisorError::Interrupted {
                    service: descriptor.name.to_string(),
                });
            }

            // Exit-during-startup check under a short lock.
            {
                let mut managed = self.managed.lock().await;
                if let Some(entry) = managed.iter_mut().find(|m| m.name == descriptor.name) {
                    if let Ok(Some(status)) = entry.child.try_wait() {
                        let name = descriptor.name.to_string();
                        managed.retain(|m| m.name != name);
                        drop(managed);
                        pidfile::remove_pidfile(&self.run_dir, descriptor.name);
                        return Err(SupervisorError::ExitedDuringStartup {
                            service: name,
                            status: status.to_string(),
                        });
                    }
                }
            }

            let up = match &descriptor.ready {
                ReadyProbe::TcpPort(port) => is_port_in_use(*port).await,
                ReadyProbe::Http { port, path } => {
                    check_http_health(&self.http, *port, path).await
                }
            };
            if up {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(SupervisorError::ReadyTimeout {
                    service: descriptor.name.to_string(),
                    timeout_secs: descriptor.ready_timeout.as_secs(),
                });
            }

            sleep(interval).await;
            interval = (interval * 2).min(max_interval);
        }
    }

    /// Launch every descriptor in order. A required-tier failure aborts the
    /// sequence; an optional-tier failure is logged and skipped.
    pub async fn launch_all(
        &self,
        descriptors: &[ServiceDescriptor],
    ) -> Result<(), SupervisorError> {
        'services: for descriptor in descriptors {
            if self.is_shutting_down() {
                return Err(SupervisorError::Interrupted {
                    service: descriptor.name.to_string(),
                });
            }
            for dep in &descriptor.depends_on {
                if !self.is_managed(dep).await {
                    if descriptor.tier == Tier::Optional {
                        warn!(
                            "skipping optional {}: dependency {} is not running",
                            descriptor.name, dep
                        );
                        continue 'services;
                    }
                    return Err(SupervisorError::launch(
                        descriptor.name,
                        format!("dependency {} is not running", dep),
                    ));
                }
            }

            match self.launch(descriptor).await {
                Ok(()) => {}
                Err(e) if descriptor.tier == Tier::Optional => {
                    warn!("{} failed to start, continuing without it: {}", descriptor.name, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Stop one managed process: graceful signal, bounded wait, forced kill.
    /// Never returns an error — every failure is captured in the result.
    async fn stop_process(&self, mut entry: ManagedProcess, grace: Duration) -> ShutdownResult {
        let name = entry.name.clone();
        pidfile::remove_pidfile(&self.run_dir, &name);

        match entry.child.try_wait() {
            Ok(Some(_)) => {
                return ShutdownResult {
                    name,
                    outcome: ShutdownOutcome::AlreadyStopped,
                    detail: None,
                };
            }
            Ok(None) => {}
            Err(e) => {
                return ShutdownResult {
                    name,
                    outcome: ShutdownOutcome::Failed,
                    detail: Some(format!("could not query process: {}", e)),
                };
            }
        }

        info!("stopping {}...", name);
        let signalled = entry.pid.map(scanner::signal_term).unwrap_or(false);
        if !signalled {
            // No pid or the graceful signal failed; go straight to kill.
            if let Err(e) = entry.child.kill().await {
                return ShutdownResult {
                    name,
                    outcome: ShutdownOutcome::Failed,
                    detail: Some(format!("kill failed: {}", e)),
                };
            }
            let _ = entry.child.wait().await;
            return ShutdownResult {
                name,
                outcome: ShutdownOutcome::ForceKilled,
                detail: Some("no graceful signal available".to_string()),
            };
        }

        match timeout(grace, entry.child.wait()).await {
            Ok(Ok(_)) => ShutdownResult {
                name,
                outcome: ShutdownOutcome::Terminated,
                detail: None,
            },
            Ok(Err(e)) => ShutdownResult {
                name,
                outcome: ShutdownOutcome::Failed,
                detail: Some(format!("wait failed: {}", e)),
            },
            Err(_) => {
                warn!("{} did not exit within {:?}, force killing", name, grace);
                match entry.child.kill().await {
                    Ok(()) => {
                        let _ = entry.child.wait().await;
                        ShutdownResult {
                            name,
                            outcome: ShutdownOutcome::ForceKilled,
                            detail: None,
                        }
                    }
                    Err(e) => ShutdownResult {
                        name,
                        outcome: ShutdownOutcome::Failed,
                        detail: Some(format!("kill failed: {}", e)),
                    },
                }
            }
        }
    }

    /// Stop a single service by name, leaving the rest of the set running.
    pub async fn stop(&self, name: &str) -> Option<ShutdownResult> {
        let entry = {
            let mut managed = self.managed.lock().await;
            let idx = managed.iter().position(|m| m.name == name)?;
            managed.remove(idx)
        };
        Some(
            self.stop_process(entry, Duration::from_secs(GRACEFUL_TERM_TIMEOUT_SECS))
                .await,
        )
    }

    /// Stop every managed process and clear the set. Idempotent: a second
    /// call finds nothing to stop and returns an empty result list. Marks
    /// the supervisor as shutting down, which interrupts any launch still
    /// in its readiness wait and refuses launches from then on.
    pub async fn stop_all(&self) -> Vec<ShutdownResult> {
        let drained: Vec<ManagedProcess> = {
            let mut managed = self.managed.lock().await;
            self.shutdown_started.store(true, Ordering::SeqCst);
            managed.drain(..).collect()
        };

        if drained.is_empty() {
            return Vec::new();
        }

        let grace = Duration::from_secs(GRACEFUL_TERM_TIMEOUT_SECS);
        let mut results = Vec::with_capacity(drained.len());
        for entry in drained {
            let result = self.stop_process(entry, grace).await;
            match result.outcome {
                ShutdownOutcome::Failed => {
                    warn!(
                        "error stopping {}: {}",
                        result.name,
                        result.detail.as_deref().unwrap_or("unknown")
                    );
                }
                outcome => info!("{} {}", result.name, outcome),
            }
            results.push(result);
        }
        results
    }
}

fn spawn_command(descriptor: &ServiceDescriptor) -> std::io::Result<Child> {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(&descriptor.program).args(&descriptor.args);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new(&descriptor.program);
        cmd.args(&descriptor.args);
        cmd
    };

    cmd.current_dir(&descriptor.working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
}
