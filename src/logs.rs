use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tracing::{debug, error, info, warn};

/// Spawn a background task that forwards a child's stdout lines into the
/// supervisor log, tagged with the service name.
pub fn spawn_stdout_reader(service: &str, stdout: ChildStdout) -> tokio::task::JoinHandle<()> {
    let service = service.to_string();
    tokio::spawn(async move {
        let reader = BufReader::new(stdout);
        let mut lines = reader.lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match classify_line(&line) {
                    LineLevel::Error => error!(service = %service, "{}", line),
                    LineLevel::Warn => warn!(service = %service, "{}", line),
                    LineLevel::Debug => debug!(service = %service, "{}", line),
                    LineLevel::Info => info!(service = %service, "{}", line),
                },
                Ok(None) => {
                    debug!(service = %service, "stdout closed");
                    break;
                }
                Err(e) => {
                    warn!(service = %service, "error reading stdout: {}", e);
                    break;
                }
            }
        }
    })
}

/// Stderr counterpart; lines default to warn rather than error because the
/// Node dev servers write ordinary progress output to stderr.
pub fn spawn_stderr_reader(service: &str, stderr: ChildStderr) -> tokio::task::JoinHandle<()> {
    let service = service.to_string();
    tokio::spawn(async move {
        let reader = BufReader::new(stderr);
        let mut lines = reader.lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if matches!(classify_line(&line), LineLevel::Error) {
                        error!(service = %service, "{}", line);
                    } else {
                        warn!(service = %service, "{}", line);
                    }
                }
                Ok(None) => {
                    debug!(service = %service, "stderr closed");
                    break;
                }
                Err(e) => {
                    warn!(service = %service, "error reading stderr: {}", e);
                    break;
                }
            }
        }
    })
}

#[derive(Debug, PartialEq)]
pub enum LineLevel {
    Info,
    Warn,
    Error,
    Debug,
}

pub fn classify_line(line: &str) -> LineLevel {
    if line.contains("ERROR") || line.contains("Error:") || line.contains("UnhandledPromiseRejection")
    {
        LineLevel::Error
    } else if line.contains("WARN") || line.contains("warning") || line.contains("DeprecationWarning")
    {
        LineLevel::Warn
    } else if line.contains("DEBUG") || line.contains("TRACE") {
        LineLevel::Debug
    } else {
        LineLevel::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error_lines() {
        assert_eq!(classify_line("ERROR connecting to db"), LineLevel::Error);
        assert_eq!(
            classify_line("Error: listen EADDRINUSE :::5000"),
            LineLevel::Error
        );
    }

    #[test]
    fn test_classify_warn_lines() {
        assert_eq!(classify_line("npm WARN deprecated"), LineLevel::Warn);
        assert_eq!(
            classify_line("(node:123) DeprecationWarning: Buffer()"),
            LineLevel::Warn
        );
    }

    #[test]
    fn test_classify_plain_lines_are_info() {
        assert_eq!(
            classify_line("Compiled successfully!"),
            LineLevel::Info
        );
        assert_eq!(classify_line(""), LineLevel::Info);
    }

    #[test]
    fn test_classify_debug_lines() {
        assert_eq!(classify_line("DEBUG route matched"), LineLevel::Debug);
    }
}
