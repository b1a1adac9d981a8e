//! Host prerequisite checks and first-run dependency installation.
//!
//! Required tools (node, npm, mongod) must be on PATH before anything
//! launches. A missing tool prints install instructions, opens the vendor's
//! download page, waits for the user, and fails the startup with zero
//! processes launched. The install step mirrors a fresh-laptop setup:
//! npm install for both Node services and a virtualenv for the AI service.

use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::SupervisorConfig;
use crate::error::SupervisorError;

pub const NODE_INSTALL_URL: &str = "https://nodejs.org/";
pub const MONGO_INSTALL_URL: &str = "https://www.mongodb.com/try/download/community";

/// Locate an executable on PATH. On windows the usual launcher extensions
/// are tried as well.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            for ext in ["exe", "cmd", "bat"] {
                let candidate = dir.join(format!("{}.{}", name, ext));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

fn check_tool(name: &str, url: &str) -> Result<PathBuf, SupervisorError> {
    find_executable(name).ok_or_else(|| SupervisorError::Prerequisite {
        tool: name.to_string(),
        url: url.to_string(),
    })
}

/// Verify every required tool is present. `interactive` controls whether a
/// missing tool opens its installer page and blocks on user confirmation
/// before the failure is returned.
pub async fn check_prerequisites(interactive: bool) -> Result<(), SupervisorError> {
    println!("Checking system dependencies...");

    for (tool, url) in [
        ("node", NODE_INSTALL_URL),
        ("npm", NODE_INSTALL_URL),
        ("mongod", MONGO_INSTALL_URL),
    ] {
        match check_tool(tool, url) {
            Ok(path) => println!("  {} found: {}", tool, path.display()),
            Err(e) => {
                println!("  {} is not installed or not on PATH.", tool);
                println!("  Install it from: {}", url);
                if interactive {
                    open_in_browser(url).await;
                    wait_for_enter(&format!(
                        "Press Enter after installing {}, then re-run this command...",
                        tool
                    ))
                    .await;
                }
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Install service dependencies: npm packages for backend and frontend,
/// virtualenv plus pip requirements for the AI service. Backend/frontend
/// failures are fatal; the AI service is optional tier, so its setup only
/// warns.
pub async fn install_dependencies(config: &SupervisorConfig) -> Result<(), SupervisorError> {
    for (label, dir) in [
        ("backend", config.project_dir.join("server")),
        ("frontend", config.project_dir.join("client")),
    ] {
        info!("installing {} dependencies...", label);
        if !run_step("npm", &["install"], &dir).await {
            return Err(SupervisorError::launch(
                label,
                format!("npm install failed in {}", dir.display()),
            ));
        }
    }

    if config.skip_ai {
        return Ok(());
    }

    let ai_dir = config.project_dir.join("ai_service");
    let venv_python = config.ai_venv_python();
    if !venv_python.exists() {
        info!("creating AI service virtualenv...");
        let python = if cfg!(windows) { "python" } else { "python3" };
        if !run_step(python, &["-m", "venv", "venv"], &ai_dir).await {
            warn!("could not create AI virtualenv; AI service may not start");
            return Ok(());
        }
    }

    info!("installing AI service requirements...");
    let venv_python = venv_python.display().to_string();
    if !run_step(&venv_python, &["-m", "pip", "install", "-r", "requirements.txt"], &ai_dir).await {
        warn!("pip install failed; AI service may not start");
    }
    Ok(())
}

async fn run_step(program: &str, args: &[&str], dir: &Path) -> bool {
    #[cfg(windows)]
    let status = {
        let joined = format!("{} {}", program, args.join(" "));
        Command::new("cmd")
            .args(["/C", &joined])
            .current_dir(dir)
            .status()
            .await
    };

    #[cfg(not(windows))]
    let status = Command::new(program).args(args).current_dir(dir).status().await;

    match status {
        Ok(status) => status.success(),
        Err(e) => {
            warn!("{} {:?} failed to run: {}", program, args, e);
            false
        }
    }
}

/// Open a URL in the default browser, best effort.
pub async fn open_in_browser(url: &str) {
    #[cfg(target_os = "windows")]
    let result = Command::new("cmd").args(["/C", "start", "", url]).spawn();

    #[cfg(target_os = "macos")]
    let result = Command::new("open").arg(url).spawn();

    #[cfg(all(unix, not(target_os = "macos")))]
    let result = Command::new("xdg-open").arg(url).spawn();

    if let Err(e) = result {
        warn!("could not open browser for {}: {}", url, e);
    }
}

async fn wait_for_enter(prompt: &str) {
    println!("{}", prompt);
    let _ = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    })
    .await;
}
