use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use healthstack_supervisor::config::{
    self, Cli, Command, StatusArgs, StopArgs, SupervisorConfig, DEFAULT_FRONTEND_URL,
    GRACEFUL_TERM_TIMEOUT_SECS, SERVICE_PORTS, SHUTDOWN_PATTERNS, SHUTDOWN_PORTS,
};
use healthstack_supervisor::deps;
use healthstack_supervisor::lifecycle::{self, Lifecycle};
use healthstack_supervisor::pidfile;
use healthstack_supervisor::process::manager::Supervisor;
use healthstack_supervisor::process::port::{is_port_in_use, wait_for_port_free};
use healthstack_supervisor::process::scanner::{self, PortMatch};
use healthstack_supervisor::smoke;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Start(args) => run_start(SupervisorConfig::from_args(args)).await,
        Command::Stop(args) => {
            let _guard = init_tracing(None);
            run_stop(args).await
        }
        Command::Status(args) => {
            let _guard = init_tracing(None);
            run_status(args).await
        }
        Command::Smoke(args) => {
            let _guard = init_tracing(None);
            smoke::run(&args).await?;
            Ok(())
        }
    }
}

/// Console logging always; plus a plain-text lifecycle log file for `start`.
fn init_tracing(log_file: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "healthstack_supervisor=info".into());

    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "supervisor.log".to_string());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}

async fn run_start(config: SupervisorConfig) -> anyhow::Result<()> {
    let _guard = init_tracing(Some(&config.log_file));
    info!(
        "starting healthstack-supervisor v{}",
        env!("CARGO_PKG_VERSION")
    );

    if !config.project_dir.exists() {
        error!(
            "project directory does not exist: {}",
            config.project_dir.display()
        );
        std::process::exit(1);
    }

    println!("Starting healthcare app services");
    println!("{}", "=".repeat(50));

    if let Err(e) = deps::check_prerequisites(true).await {
        error!("{}", e);
        std::process::exit(1);
    }

    if !config.skip_install {
        if let Err(e) = deps::install_dependencies(&config).await {
            error!("dependency installation failed: {}", e);
            std::process::exit(1);
        }
    }

    std::fs::create_dir_all(config.mongo_data_dir())?;

    let supervisor = Arc::new(Supervisor::new(config.run_dir()));
    let lifecycle = Lifecycle::new();
    let _signal_task = lifecycle::spawn_signal_listener(supervisor.clone(), lifecycle.clone());

    if let Err(e) = supervisor.launch_all(&config.service_descriptors()).await {
        error!("startup failed: {}", e);
        lifecycle.shut_down(&supervisor).await;
        std::process::exit(1);
    }

    println!("{}", "=".repeat(50));
    println!("All services started");
    println!("  Frontend:   http://localhost:{}", config::FRONTEND_PORT);
    println!("  Backend:    http://localhost:{}", config::BACKEND_PORT);
    println!("  AI Service: http://localhost:{}", config::AI_SERVICE_PORT);
    println!("  MongoDB:    localhost:{}", config::MONGO_PORT);
    println!("\nPress Ctrl+C to stop all services");

    if config.open_browser {
        deps::open_in_browser(DEFAULT_FRONTEND_URL).await;
    }

    lifecycle::run_until_stopped(&lifecycle).await;

    if lifecycle.shutdown_failed.load(Ordering::SeqCst) {
        std::process::exit(1);
    }
    Ok(())
}

/// Standalone stop: pidfiles first, then pattern and port scans, merged and
/// deduplicated by pid so nothing is terminated twice.
async fn run_stop(args: StopArgs) -> anyhow::Result<()> {
    println!("Stopping healthcare app services");
    println!("{}", "=".repeat(50));

    let run_dir = config::run_dir(&args.project_dir);
    let recorded = pidfile::read_pidfiles(&run_dir);
    let from_pidfiles: Vec<PortMatch> = recorded
        .iter()
        .map(|(service, pid)| PortMatch {
            pid: *pid,
            port: None,
            process_name: service.clone(),
        })
        .collect();

    let by_pattern = scanner::find_by_command_pattern(SHUTDOWN_PATTERNS);
    let by_port = scanner::find_by_listening_port(SHUTDOWN_PORTS).await;
    let merged = scanner::merge(from_pidfiles, scanner::merge(by_pattern, by_port));

    if merged.is_empty() {
        println!("No matching processes found");
        return Ok(());
    }

    let results =
        scanner::terminate_all(&merged, Duration::from_secs(GRACEFUL_TERM_TIMEOUT_SECS)).await;
    for (service, _) in &recorded {
        pidfile::remove_pidfile(&run_dir, service);
    }

    // The ports should drain once their owners are gone; a survivor here
    // means something outside the kill list is still bound.
    for &port in SHUTDOWN_PORTS {
        if !wait_for_port_free(port, GRACEFUL_TERM_TIMEOUT_SECS).await {
            println!("  warning: port {} is still in use", port);
        }
    }

    println!("{}", "=".repeat(50));
    for result in &results {
        match &result.detail {
            Some(detail) => println!("  {}: {} ({})", result.name, result.outcome, detail),
            None => println!("  {}: {}", result.name, result.outcome),
        }
    }
    let failures = results.iter().filter(|r| !r.succeeded()).count();
    println!(
        "Stopped {} of {} processes",
        results.len() - failures,
        results.len()
    );
    Ok(())
}

/// Port/health probe per service, in launch order.
async fn run_status(args: StatusArgs) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()?;
    let backend_health = format!("{}/api/health", args.backend_url.trim_end_matches('/'));

    for (name, port) in SERVICE_PORTS {
        // The backend gets a real HTTP health check so a bound-but-broken
        // server shows as down; the rest are plain port probes.
        let available = if *name == "backend" {
            match client.get(&backend_health).send().await {
                Ok(resp) => resp.status().is_success(),
                Err(_) => false,
            }
        } else {
            is_port_in_use(*port).await
        };
        println!(
            "  {:<12} port {:<6} {}",
            name,
            port,
            if available { "up" } else { "down" }
        );
    }
    Ok(())
}
