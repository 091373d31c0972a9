//! Suite lifecycle controller
//!
//! A [`ConformanceSuite`] moves through
//! `Uninitialized -> Configured -> SetUp -> Running -> Completed`:
//!
//! - [`ConformanceSuite::new`] validates the run options (Configured).
//! - [`ConformanceSuite::setup`] applies the shared base resources and waits
//!   for the base Gateways to be accepted. It can be repeated.
//! - [`ConformanceSuite::run`] executes resolved cases one at a time and
//!   returns a [`RunReport`]. A failing case never stops the run.
//!
//! The controller imposes no global timeout; each check bounds its own
//! polling with the run's [`TimeoutConfig`].

pub mod base;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ResourceRef, TargetClient};
use crate::exclusion::ExclusionList;
use crate::features::CapabilityDeclaration;
use crate::kube_utils::{bounded, poll_until};
use crate::registry::{CheckContext, CheckFailure, TestCase, TestRegistry};
use crate::report::{Outcome, RunReport, TestResult};
use crate::resolver::{resolve, select_single};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::timeouts::TimeoutConfig;
use crate::{Error, Result};

/// Attempts for applying or deleting one base resource
const BASE_RESOURCE_ATTEMPTS: u32 = 3;

/// Everything one invocation of the suite needs
#[derive(Clone)]
pub struct RunOptions {
    /// Client for the cluster under test
    pub client: Arc<dyn TargetClient>,
    /// GatewayClass under test
    pub gateway_class_name: String,
    /// Supported and exempt features
    pub capabilities: CapabilityDeclaration,
    /// Tests never run
    pub exclusions: ExclusionList,
    /// Polling budgets
    pub timeouts: TimeoutConfig,
    /// Verbose diagnostics
    pub debug: bool,
    /// Delete base resources once the run completes
    pub cleanup_base_resources: bool,
    /// Run only this test
    pub run_test: Option<String>,
}

/// Lifecycle state of a suite
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuitePhase {
    /// Options not yet validated
    Uninitialized,
    /// Options validated
    Configured,
    /// Base resources present
    SetUp,
    /// Cases executing
    Running,
    /// Every resolved case attempted or skipped
    Completed,
}

impl fmt::Display for SuitePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SuitePhase::Uninitialized => "Uninitialized",
            SuitePhase::Configured => "Configured",
            SuitePhase::SetUp => "SetUp",
            SuitePhase::Running => "Running",
            SuitePhase::Completed => "Completed",
        };
        f.write_str(s)
    }
}

/// Drives setup and sequential execution of a resolved test set
pub struct ConformanceSuite<'r> {
    client: Arc<dyn TargetClient>,
    gateway_class_name: String,
    capabilities: Arc<CapabilityDeclaration>,
    exclusions: ExclusionList,
    timeouts: TimeoutConfig,
    debug: bool,
    cleanup_base_resources: bool,
    run_test: Option<String>,
    registry: &'r TestRegistry,
    phase: SuitePhase,
    cancel: CancellationToken,
    retry: RetryConfig,
    applied: Vec<ResourceRef>,
}

impl<'r> ConformanceSuite<'r> {
    /// Validate options against the registry
    ///
    /// Nothing touches the cluster until [`setup`](Self::setup), so a
    /// configuration error here leaves the cluster unchanged.
    pub fn new(options: RunOptions, registry: &'r TestRegistry) -> Result<Self> {
        let mut phase = SuitePhase::Uninitialized;
        debug!(phase = %phase, "validating run options");

        validate_run(
            &options.gateway_class_name,
            &options.timeouts,
            &options.exclusions,
            options.run_test.as_deref(),
            registry,
        )?;

        phase = SuitePhase::Configured;
        info!(
            gateway_class = %options.gateway_class_name,
            supported = %options.capabilities.supported(),
            exempt = %options.capabilities.exempt(),
            excluded = options.exclusions.len(),
            "conformance suite configured"
        );

        Ok(Self {
            client: options.client,
            gateway_class_name: options.gateway_class_name,
            capabilities: Arc::new(options.capabilities),
            exclusions: options.exclusions,
            timeouts: options.timeouts,
            debug: options.debug,
            cleanup_base_resources: options.cleanup_base_resources,
            run_test: options.run_test,
            registry,
            phase,
            cancel: CancellationToken::new(),
            retry: RetryConfig::with_max_attempts(BASE_RESOURCE_ATTEMPTS),
            applied: Vec::new(),
        })
    }

    /// Observe an external cancellation signal
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override retry behaviour for base resources
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SuitePhase {
        self.phase
    }

    /// Registry cases minus exclusions, narrowed by `run_test` if set
    pub fn resolved_tests(&self) -> Result<Vec<&'r TestCase>> {
        let resolved = resolve(self.registry, &self.exclusions);
        match &self.run_test {
            Some(name) => select_single(self.registry, resolved, name),
            None => Ok(resolved),
        }
    }

    /// Create or confirm the shared base resources
    ///
    /// Resources are applied with server-side apply, so repeating setup
    /// against an already prepared cluster converges on the same state.
    /// When setup fails and cleanup was requested, whatever was applied is
    /// deleted again before the error is returned.
    pub async fn setup(&mut self) -> Result<()> {
        if !matches!(self.phase, SuitePhase::Configured | SuitePhase::SetUp) {
            return Err(Error::internal_with_context(
                "suite",
                format!("setup is not allowed in phase {}", self.phase),
            ));
        }

        info!(gateway_class = %self.gateway_class_name, "preparing base resources");
        if let Err(e) = self.prepare_base_resources().await {
            if self.cleanup_base_resources {
                let warnings = self.cleanup().await;
                if !warnings.is_empty() {
                    warn!(
                        remaining = warnings.len(),
                        "base resources left behind after failed setup"
                    );
                }
            }
            return Err(e);
        }

        self.phase = SuitePhase::SetUp;
        Ok(())
    }

    async fn prepare_base_resources(&mut self) -> Result<()> {
        let create_timeout = self.timeouts.create_timeout;
        for manifest in base::base_manifests(&self.gateway_class_name)? {
            let resource = manifest.reference().clone();
            let client = &self.client;
            let manifest = &manifest;
            let operation = format!("apply {}", resource);
            let operation = operation.as_str();
            retry_with_backoff(
                &self.retry,
                operation,
                |e: &Error| e.is_retryable(),
                || async move { bounded(create_timeout, operation, client.apply(manifest)).await },
            )
            .await
            .map_err(|e| Error::setup_for(resource.to_string(), e.to_string()))?;

            debug!(resource = %resource, "base resource applied");
            if !self.applied.contains(&resource) {
                self.applied.push(resource);
            }
        }

        let get_timeout = self.timeouts.get_timeout;
        for gateway in base::base_gateways() {
            let client = &self.client;
            let gw = &gateway;
            poll_until(
                &self.cancel,
                self.timeouts.namespaces_must_be_ready,
                self.timeouts.poll_interval,
                format!("{} to be accepted", gateway),
                || async move {
                    Ok(bounded(get_timeout, "get base gateway", client.get(gw))
                        .await?
                        .map(|v| base::gateway_is_accepted(&v))
                        .unwrap_or(false))
                },
            )
            .await
            .map_err(|f| Error::setup_for(gateway.to_string(), f.to_string()))?;
            info!(gateway = %gateway, "base gateway accepted");
        }
        Ok(())
    }

    /// Execute resolved cases sequentially and collect their outcomes
    pub async fn run(&mut self, tests: &[&TestCase]) -> Result<RunReport> {
        if self.phase != SuitePhase::SetUp {
            return Err(Error::internal_with_context(
                "suite",
                format!("run requires phase SetUp, suite is {}", self.phase),
            ));
        }
        self.phase = SuitePhase::Running;

        let ctx = CheckContext::new(
            self.client.clone(),
            self.gateway_class_name.clone(),
            self.timeouts.clone(),
            self.capabilities.clone(),
            self.cancel.clone(),
            self.debug,
        );
        let mut report = RunReport::new(&self.gateway_class_name, Utc::now());
        info!(tests = tests.len(), "running conformance tests");

        for case in tests {
            let result = self.run_case(case, &ctx).await;
            report.record(result);
        }

        if self.cleanup_base_resources {
            report.cleanup_warnings = self.cleanup().await;
        }

        self.phase = SuitePhase::Completed;
        Ok(report)
    }

    async fn run_case(&self, case: &TestCase, ctx: &CheckContext) -> TestResult {
        let name = case.short_name();
        let record = |outcome: Outcome, waived: Vec<String>, elapsed: Duration| {
            TestResult::new(name, case.description(), outcome, waived, elapsed)
        };

        if self.cancel.is_cancelled() {
            return record(Outcome::Cancelled, Vec::new(), Duration::ZERO);
        }

        let missing = self.capabilities.missing_features(case.features());
        if !missing.is_empty() {
            info!(test = %name, missing = %missing, "skipping test: required features not supported");
            return record(
                Outcome::Skipped {
                    missing_features: missing.names(),
                },
                Vec::new(),
                Duration::ZERO,
            );
        }

        let waived = self.capabilities.waived_features(case.features());
        if !waived.is_empty() {
            info!(test = %name, waived = %waived, "running with exempt feature assertions waived");
        }

        info!(test = %name, "running test");
        let start = Instant::now();
        let check = case.check().clone();
        // Checks observe the token themselves so their own teardown runs.
        let result = AssertUnwindSafe(async { check.check(ctx).await })
            .catch_unwind()
            .await;
        let outcome = match result {
            Ok(Ok(())) => Outcome::Passed,
            Ok(Err(CheckFailure::Cancelled)) => Outcome::Cancelled,
            Ok(Err(_)) if self.cancel.is_cancelled() => Outcome::Cancelled,
            Ok(Err(failure)) => Outcome::Failed {
                reason: failure.to_string(),
            },
            Err(panic) => Outcome::Failed {
                reason: format!("PANIC: {}", panic_message(panic.as_ref())),
            },
        };

        match &outcome {
            Outcome::Failed { reason } => warn!(test = %name, reason = %reason, "test failed"),
            other => info!(test = %name, outcome = other.tag(), "test finished"),
        }
        record(outcome, waived.names(), start.elapsed())
    }

    /// Delete base resources in reverse creation order
    ///
    /// Failures become warnings; recorded outcomes are never touched.
    async fn cleanup(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        let delete_timeout = self.timeouts.delete_timeout;
        for resource in self.applied.iter().rev() {
            let client = &self.client;
            let operation = format!("delete {}", resource);
            let operation = operation.as_str();
            let result = retry_with_backoff(
                &self.retry,
                operation,
                |e: &Error| e.is_retryable(),
                || async move { bounded(delete_timeout, operation, client.delete(resource)).await },
            )
            .await;
            match result {
                Ok(_) => debug!(resource = %resource, "base resource deleted"),
                Err(e) => {
                    let err = Error::cleanup_for(resource.to_string(), e.to_string());
                    warn!(error = %err, "failed to delete base resource");
                    warnings.push(err.to_string());
                }
            }
        }
        self.applied.clear();
        warnings
    }
}

/// Check run parameters against the registry
///
/// Shared by the command line and [`ConformanceSuite::new`]; nothing here
/// touches the cluster.
pub fn validate_run(
    gateway_class_name: &str,
    timeouts: &TimeoutConfig,
    exclusions: &ExclusionList,
    run_test: Option<&str>,
    registry: &TestRegistry,
) -> Result<()> {
    if gateway_class_name.is_empty() {
        return Err(Error::validation(
            "gateway-class",
            "GatewayClass name must not be empty",
        ));
    }
    timeouts.validate()?;
    exclusions.validate_against(registry)?;
    if let Some(name) = run_test {
        if !registry.contains(name) {
            return Err(Error::validation(
                "run-test",
                format!("unknown test name '{}'", name),
            ));
        }
    }
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
