//! Soft-assert check collector. Every check is recorded and the run always
//! continues to the next one; the summary at the end lists both columns.

use std::fmt;
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Fail,
}

#[derive(Debug, Clone)]
pub struct CheckRecord {
    pub label: String,
    pub outcome: CheckOutcome,
    pub detail: Option<String>,
}

impl fmt::Display for CheckRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = match self.outcome {
            CheckOutcome::Pass => "PASS",
            CheckOutcome::Fail => "FAIL",
        };
        match &self.detail {
            Some(detail) => write!(f, "[{}] {}: {}", mark, self.label, detail),
            None => write!(f, "[{}] {}", mark, self.label),
        }
    }
}

#[derive(Default)]
pub struct CheckReport {
    records: Vec<CheckRecord>,
}

impl CheckReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass(&mut self, label: &str, detail: Option<String>) {
        let record = CheckRecord {
            label: label.to_string(),
            outcome: CheckOutcome::Pass,
            detail,
        };
        println!("{}", record);
        self.records.push(record);
    }

    pub fn fail(&mut self, label: &str, detail: impl Into<String>) {
        let record = CheckRecord {
            label: label.to_string(),
            outcome: CheckOutcome::Fail,
            detail: Some(detail.into()),
        };
        println!("{}", record);
        self.records.push(record);
    }

    /// Run one check: an Ok result (with optional detail text) passes, any
    /// error is captured as a failure. The error never escapes.
    pub async fn run<F>(&mut self, label: &str, check: F)
    where
        F: Future<Output = anyhow::Result<Option<String>>>,
    {
        match check.await {
            Ok(detail) => self.pass(label, detail),
            Err(e) => self.fail(label, e.to_string()),
        }
    }

    pub fn records(&self) -> &[CheckRecord] {
        &self.records
    }

    pub fn passed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome == CheckOutcome::Pass)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    pub fn print_summary(&self) {
        println!("{}", "=".repeat(50));
        println!(
            "{} checks: {} passed, {} failed",
            self.records.len(),
            self.passed(),
            self.failed()
        );
        for record in self.records.iter().filter(|r| r.outcome == CheckOutcome::Fail) {
            println!("  {}", record);
        }
    }
}
