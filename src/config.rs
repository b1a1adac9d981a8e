use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Healthstack Supervisor: manages the healthcare app's service processes.
#[derive(Parser, Debug)]
#[command(name = "healthstack-supervisor", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check prerequisites, launch all services and supervise them until interrupted
    Start(StartArgs),
    /// Stop services from a separate invocation (pidfiles, then process/port scan)
    Stop(StopArgs),
    /// Show which service ports are currently responding
    Status(StatusArgs),
    /// Run HTTP smoke checks against the running services
    Smoke(SmokeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StartArgs {
    /// Path to the application root (contains server/, client/, ai_service/)
    #[arg(short = 'p', long = "project-dir", default_value = ".")]
    pub project_dir: PathBuf,

    /// Skip npm install / pip install of service dependencies
    #[arg(long = "skip-install")]
    pub skip_install: bool,

    /// Do not launch the optional AI service
    #[arg(long = "skip-ai")]
    pub skip_ai: bool,

    /// Do not open the frontend in the default browser after startup
    #[arg(long = "no-browser")]
    pub no_browser: bool,

    /// Lifecycle log file (default: <project-dir>/supervisor.log)
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StopArgs {
    /// Path to the application root (used to locate pidfiles)
    #[arg(short = 'p', long = "project-dir", default_value = ".")]
    pub project_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long = "backend-url", default_value = DEFAULT_BACKEND_URL)]
    pub backend_url: String,
}

#[derive(Args, Debug, Clone)]
pub struct SmokeArgs {
    /// Which suite to run: all, health, auth, search, analysis, load
    #[arg(long = "suite", default_value = "all")]
    pub suite: String,

    #[arg(long = "backend-url", default_value = DEFAULT_BACKEND_URL)]
    pub backend_url: String,

    #[arg(long = "ai-url", default_value = DEFAULT_AI_URL)]
    pub ai_url: String,

    #[arg(long = "frontend-url", default_value = DEFAULT_FRONTEND_URL)]
    pub frontend_url: String,
}

// Fixed port assignments for the application stack.
pub const FRONTEND_PORT: u16 = 3000;
pub const BACKEND_PORT: u16 = 5000;
pub const AI_SERVICE_PORT: u16 = 5001;
pub const MONGO_PORT: u16 = 27017;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
pub const DEFAULT_AI_URL: &str = "http://localhost:5001";
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";

// Process constants
pub const GRACEFUL_TERM_TIMEOUT_SECS: u64 = 5;
pub const READY_POLL_INITIAL_MS: u64 = 200;
pub const READY_POLL_MAX_MS: u64 = 2000;
pub const PORT_CHECK_INTERVAL_MS: u64 = 500;
pub const RUN_LOOP_TICK_MS: u64 = 500;

// Smoke-test constants
pub const SMOKE_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const LOAD_CHECK_REQUESTS: usize = 10;
pub const LOAD_CHECK_POOL_SIZE: usize = 5;

/// Command-line substrings identifying stack processes, for the standalone
/// stop path. First match wins per process. The database is deliberately
/// absent: a mongod we did not launch is left alone.
pub const SHUTDOWN_PATTERNS: &[&str] = &[
    "npm start",
    "node index.js",
    "python app.py",
    "react-scripts start",
    "healthcare",
];

/// Ports scanned for listeners by the standalone stop path.
pub const SHUTDOWN_PORTS: &[u16] = &[FRONTEND_PORT, BACKEND_PORT, AI_SERVICE_PORT];

/// Service ports probed by the `status` subcommand.
pub const SERVICE_PORTS: &[(&str, u16)] = &[
    ("mongodb", MONGO_PORT),
    ("backend", BACKEND_PORT),
    ("ai-service", AI_SERVICE_PORT),
    ("frontend", FRONTEND_PORT),
];

/// Which launch tier a service belongs to. A required service failing to
/// start aborts the whole sequence; an optional one only logs a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Required,
    Optional,
}

/// Readiness probe for a freshly launched service.
#[derive(Debug, Clone)]
pub enum ReadyProbe {
    /// Something accepts TCP connections on the port.
    TcpPort(u16),
    /// An HTTP GET on the port+path returns a success status.
    Http { port: u16, path: &'static str },
}

/// Static description of one managed service. Immutable once built; the
/// ordered descriptor list drives launch order.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub depends_on: Vec<&'static str>,
    pub tier: Tier,
    pub ready: ReadyProbe,
    pub ready_timeout: Duration,
}

/// Runtime configuration for the `start` subcommand.
pub struct SupervisorConfig {
    pub project_dir: PathBuf,
    pub skip_install: bool,
    pub skip_ai: bool,
    pub open_browser: bool,
    pub log_file: PathBuf,
}

impl SupervisorConfig {
    pub fn from_args(args: StartArgs) -> Self {
        let log_file = args
            .log_file
            .unwrap_or_else(|| args.project_dir.join("supervisor.log"));
        Self {
            project_dir: args.project_dir,
            skip_install: args.skip_install,
            skip_ai: args.skip_ai,
            open_browser: !args.no_browser,
            log_file,
        }
    }

    /// Directory holding per-service pidfiles for the standalone stop path.
    pub fn run_dir(&self) -> PathBuf {
        run_dir(&self.project_dir)
    }

    /// MongoDB data directory, created before the database launches.
    pub fn mongo_data_dir(&self) -> PathBuf {
        self.project_dir.join("data").join("db")
    }

    /// Python interpreter inside the AI service's virtualenv.
    pub fn ai_venv_python(&self) -> PathBuf {
        ai_venv_python(&self.project_dir)
    }

    /// Build the ordered launch list: database, backend, AI service, frontend.
    pub fn service_descriptors(&self) -> Vec<ServiceDescriptor> {
        let mut services = vec![
            ServiceDescriptor {
                name: "mongodb",
                program: "mongod".into(),
                args: vec![
                    "--dbpath".into(),
                    self.mongo_data_dir().display().to_string(),
                ],
                working_dir: self.project_dir.clone(),
                depends_on: vec![],
                tier: Tier::Required,
                ready: ReadyProbe::TcpPort(MONGO_PORT),
                ready_timeout: Duration::from_secs(30),
            },
            ServiceDescriptor {
                name: "backend",
                program: "npm".into(),
                args: vec!["start".into()],
                working_dir: self.project_dir.join("server"),
                depends_on: vec!["mongodb"],
                tier: Tier::Required,
                ready: ReadyProbe::Http {
                    port: BACKEND_PORT,
                    path: "/api/health",
                },
                ready_timeout: Duration::from_secs(60),
            },
        ];

        if !self.skip_ai {
            services.push(ServiceDescriptor {
                name: "ai-service",
                program: self.ai_venv_python().display().to_string(),
                args: vec!["app.py".into()],
                working_dir: self.project_dir.join("ai_service"),
                depends_on: vec!["backend"],
                tier: Tier::Optional,
                ready: ReadyProbe::TcpPort(AI_SERVICE_PORT),
                ready_timeout: Duration::from_secs(45),
            });
        }

        services.push(ServiceDescriptor {
            name: "frontend",
            program: "npm".into(),
            args: vec!["start".into()],
            working_dir: self.project_dir.join("client"),
            depends_on: vec!["backend"],
            tier: Tier::Required,
            ready: ReadyProbe::TcpPort(FRONTEND_PORT),
            ready_timeout: Duration::from_secs(120),
        });

        services
    }
}

pub fn run_dir(project_dir: &std::path::Path) -> PathBuf {
    project_dir.join(".healthstack")
}

pub fn ai_venv_python(project_dir: &std::path::Path) -> PathBuf {
    let venv = project_dir.join("ai_service").join("venv");
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn make_config(skip_ai: bool) -> SupervisorConfig {
        SupervisorConfig {
            project_dir: PathBuf::from("/tmp/healthcare-app"),
            skip_install: true,
            skip_ai,
            open_browser: false,
            log_file: PathBuf::from("/tmp/healthcare-app/supervisor.log"),
        }
    }

    #[test]
    fn test_descriptor_launch_order() {
        let config = make_config(false);
        let names: Vec<&str> = config
            .service_descriptors()
            .iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["mongodb", "backend", "ai-service", "frontend"]);
    }

    #[test]
    fn test_skip_ai_removes_optional_tier() {
        let config = make_config(true);
        let descriptors = config.service_descriptors();
        assert!(descriptors.iter().all(|d| d.name != "ai-service"));
        assert!(descriptors.iter().all(|d| d.tier == Tier::Required));
    }

    #[test]
    fn test_only_ai_service_is_optional() {
        let config = make_config(false);
        for d in config.service_descriptors() {
            if d.name == "ai-service" {
                assert_eq!(d.tier, Tier::Optional);
            } else {
                assert_eq!(d.tier, Tier::Required);
            }
        }
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let config = make_config(false);
        let descriptors = config.service_descriptors();
        for (i, d) in descriptors.iter().enumerate() {
            for dep in &d.depends_on {
                let pos = descriptors
                    .iter()
                    .position(|other| other.name == *dep)
                    .expect("dependency must be in the list");
                assert!(pos < i, "{} must launch before {}", dep, d.name);
            }
        }
    }

    #[test]
    fn test_backend_probes_health_endpoint() {
        let config = make_config(false);
        let backend = config
            .service_descriptors()
            .into_iter()
            .find(|d| d.name == "backend")
            .unwrap();
        match backend.ready {
            ReadyProbe::Http { port, path } => {
                assert_eq!(port, BACKEND_PORT);
                assert_eq!(path, "/api/health");
            }
            ReadyProbe::TcpPort(_) => panic!("backend should use an HTTP probe"),
        }
    }

    #[test]
    fn test_mongo_data_dir_under_project() {
        let config = make_config(false);
        assert_eq!(
            config.mongo_data_dir(),
            Path::new("/tmp/healthcare-app/data/db")
        );
    }

    #[test]
    fn test_run_dir_under_project() {
        assert_eq!(
            run_dir(Path::new("/srv/app")),
            PathBuf::from("/srv/app/.healthstack")
        );
    }

    #[test]
    fn test_shutdown_ports_exclude_database() {
        assert!(!SHUTDOWN_PORTS.contains(&MONGO_PORT));
    }

    #[test]
    fn test_shutdown_patterns_exclude_database() {
        assert!(SHUTDOWN_PATTERNS.iter().all(|p| !p.contains("mongod")));
    }
}
