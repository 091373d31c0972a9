//! Run results and the end-of-run summary

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

/// Longest failure reason printed in the summary banner
const MAX_REASON_CHARS: usize = 200;

/// Outcome of one resolved test case
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Outcome {
    /// The check completed without failure
    Passed,
    /// The check failed an assertion, timed out, or panicked
    Failed {
        /// Failure description
        reason: String,
    },
    /// A required feature was neither supported nor exempt
    Skipped {
        /// Required features the implementation did not declare
        #[serde(rename = "missingFeatures")]
        missing_features: Vec<String>,
    },
    /// The run was cancelled before or while the check ran
    Cancelled,
}

impl Outcome {
    /// Short tag used in the summary banner
    pub fn tag(&self) -> &'static str {
        match self {
            Outcome::Passed => "PASS",
            Outcome::Failed { .. } => "FAIL",
            Outcome::Skipped { .. } => "SKIP",
            Outcome::Cancelled => "CANCEL",
        }
    }
}

/// Result record for one resolved test case
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Test short name
    pub short_name: String,
    /// Human-readable description
    pub description: String,
    /// What happened
    pub outcome: Outcome,
    /// Required features whose assertions were waived
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub waived_features: Vec<String>,
    /// Wall-clock duration of the check
    pub duration_ms: u64,
}

impl TestResult {
    /// Build a result, converting the duration to milliseconds
    pub fn new(
        short_name: impl Into<String>,
        description: impl Into<String>,
        outcome: Outcome,
        waived_features: Vec<String>,
        duration: Duration,
    ) -> Self {
        Self {
            short_name: short_name.into(),
            description: description.into(),
            outcome,
            waived_features,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Per-case outcomes of a completed run plus cleanup warnings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// GatewayClass under test
    pub gateway_class: String,
    /// When the run started (RFC 3339)
    pub started_at: String,
    /// Results in execution order
    pub results: Vec<TestResult>,
    /// Non-fatal problems removing base resources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cleanup_warnings: Vec<String>,
}

impl RunReport {
    /// Start an empty report
    pub fn new(gateway_class: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            gateway_class: gateway_class.into(),
            started_at: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            results: Vec::new(),
            cleanup_warnings: Vec::new(),
        }
    }

    /// Append a result
    pub fn record(&mut self, result: TestResult) {
        self.results.push(result);
    }

    /// Look up a result by short name
    pub fn result(&self, short_name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.short_name == short_name)
    }

    /// Number of passed cases
    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Passed))
    }

    /// Number of failed cases
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    /// Number of skipped cases
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped { .. }))
    }

    /// Number of cancelled cases
    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Cancelled))
    }

    fn count(&self, f: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| f(&r.outcome)).count()
    }

    /// True when every case passed or was skipped
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.cancelled() == 0
    }

    /// Print the summary banner through tracing
    pub fn log_summary(&self) {
        let total: u64 = self.results.iter().map(|r| r.duration_ms).sum();

        info!("========================================");
        info!("  GATEWAY API CONFORMANCE: {}", self.gateway_class);
        info!("========================================");
        for r in &self.results {
            info!(
                "  {:6} {:48} {:.1}s",
                r.outcome.tag(),
                r.short_name,
                r.duration_ms as f64 / 1000.0
            );
            match &r.outcome {
                Outcome::Failed { reason } => {
                    let truncated: String = reason.chars().take(MAX_REASON_CHARS).collect();
                    info!("         -> {truncated}");
                }
                Outcome::Skipped { missing_features } => {
                    info!("         -> missing features: {}", missing_features.join(","));
                }
                _ => {}
            }
            if !r.waived_features.is_empty() {
                info!("         -> waived: {}", r.waived_features.join(","));
            }
        }
        info!("----------------------------------------");
        info!(
            "  {} passed, {} failed, {} skipped, {} cancelled ({:.1}s total)",
            self.passed(),
            self.failed(),
            self.skipped(),
            self.cancelled(),
            total as f64 / 1000.0
        );
        info!("========================================");
        for w in &self.cleanup_warnings {
            warn!(warning = %w, "cleanup did not complete");
        }
    }

    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::serialization(format!("failed to encode report: {}", e)))?;
        std::fs::write(path, json).map_err(|e| {
            Error::internal_with_context(
                "report",
                format!("failed to write {}: {}", path.display(), e),
            )
        })
    }
}
