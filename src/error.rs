#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("missing prerequisite: {tool} (install from {url})")]
    Prerequisite { tool: String, url: String },

    #[error("failed to launch {service}: {reason}")]
    Launch { service: String, reason: String },

    #[error("{service} did not become ready within {timeout_secs}s")]
    ReadyTimeout { service: String, timeout_secs: u64 },

    #[error("{service} exited during startup with {status}")]
    ExitedDuringStartup { service: String, status: String },

    #[error("{service} is already running")]
    AlreadyRunning { service: String },

    #[error("{service} startup interrupted by shutdown")]
    Interrupted { service: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    pub fn launch(service: &str, reason: impl Into<String>) -> Self {
        Self::Launch {
            service: service.to_string(),
            reason: reason.into(),
        }
    }
}
