//! Interrupt handling and the steady-state run loop.
//!
//! Two phases: Running and ShuttingDown. The first interrupt transitions the
//! guard and runs `stop_all` exactly once; any signal arriving mid-shutdown
//! is logged and ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::RUN_LOOP_TICK_MS;
use crate::process::manager::Supervisor;

pub struct LifecycleGuard {
    shutting_down: AtomicBool,
}

impl LifecycleGuard {
    pub fn new() -> Self {
        Self {
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Transition Running -> ShuttingDown. Returns true only for the caller
    /// that performed the transition.
    pub fn begin_shutdown(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome flags shared between the signal task and the main loop.
pub struct Lifecycle {
    pub guard: LifecycleGuard,
    pub running: AtomicBool,
    pub shutdown_failed: AtomicBool,
}

impl Lifecycle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            guard: LifecycleGuard::new(),
            running: AtomicBool::new(true),
            shutdown_failed: AtomicBool::new(false),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Invoke the supervisor's shutdown path, once. Subsequent calls return
    /// immediately. Failures flip the exit-code flag, never propagate.
    pub async fn shut_down(&self, supervisor: &Supervisor) {
        if !self.guard.begin_shutdown() {
            info!("shutdown already in progress, ignoring");
            return;
        }

        info!("shutting down all services...");
        let results = supervisor.stop_all().await;
        for result in &results {
            if !result.succeeded() {
                self.shutdown_failed.store(true, Ordering::SeqCst);
            }
        }
        info!("all services stopped ({} results)", results.len());
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Listen for Ctrl-C (and SIGTERM on unix) and route every delivery through
/// the once-only shutdown path.
pub fn spawn_signal_listener(
    supervisor: Arc<Supervisor>,
    lifecycle: Arc<Lifecycle>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            wait_for_signal().await;
            if lifecycle.guard.is_shutting_down() {
                warn!("received another signal while shutting down, ignoring");
                continue;
            }
            info!("received shutdown signal");
            lifecycle.shut_down(&supervisor).await;
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!("could not install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// The steady-state wait loop: sleep in small increments, observing the
/// running flag promptly so an interrupt proceeds straight to exit.
pub async fn run_until_stopped(lifecycle: &Lifecycle) {
    while lifecycle.is_running() {
        sleep(Duration::from_millis(RUN_LOOP_TICK_MS)).await;
    }
}
