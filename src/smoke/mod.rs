//! HTTP smoke-test harness for the running application stack.
//!
//! Every check is soft: connection failures, bad statuses and schema
//! mismatches are recorded and the run continues through the full
//! checklist, ending with a pass/fail summary.

pub mod report;
pub mod suites;
pub mod types;

use std::time::Duration;

use crate::config::{SmokeArgs, SMOKE_REQUEST_TIMEOUT_SECS};
use report::CheckReport;

pub struct SmokeContext {
    pub client: reqwest::Client,
    pub backend_url: String,
    pub ai_url: String,
    pub frontend_url: String,
}

impl SmokeContext {
    pub fn new(args: &SmokeArgs) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SMOKE_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            backend_url: args.backend_url.trim_end_matches('/').to_string(),
            ai_url: args.ai_url.trim_end_matches('/').to_string(),
            frontend_url: args.frontend_url.trim_end_matches('/').to_string(),
        })
    }
}

pub async fn run(args: &SmokeArgs) -> anyhow::Result<CheckReport> {
    let ctx = SmokeContext::new(args)?;
    let mut report = CheckReport::new();

    println!("Running smoke suite: {}", args.suite);
    println!("{}", "=".repeat(50));

    match args.suite.as_str() {
        "all" => {
            suites::health_suite(&ctx, &mut report).await;
            suites::auth_suite(&ctx, &mut report).await;
            suites::search_suite(&ctx, &mut report).await;
            suites::analysis_suite(&ctx, &mut report).await;
            suites::load_suite(&ctx, &mut report).await;
        }
        "health" => suites::health_suite(&ctx, &mut report).await,
        "auth" => suites::auth_suite(&ctx, &mut report).await,
        "search" => suites::search_suite(&ctx, &mut report).await,
        "analysis" => suites::analysis_suite(&ctx, &mut report).await,
        "load" => suites::load_suite(&ctx, &mut report).await,
        other => anyhow::bail!(
            "unknown suite '{}' (expected all, health, auth, search, analysis or load)",
            other
        ),
    }

    report.print_summary();
    Ok(report)
}
