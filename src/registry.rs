//! Test registry: the ordered set of conformance checks known to a run
//!
//! The registry is an explicit value built by the entry point and passed by
//! reference to the resolver and the suite. Cases keep their registration
//! order for the lifetime of the process.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{Manifest, ResourceRef, TargetClient};
use crate::features::{CapabilityDeclaration, FeatureSet};
use crate::kube_utils::{bounded, poll_until};
use crate::timeouts::TimeoutConfig;
use crate::{Error, Result};

/// Why a single conformance check did not pass
#[derive(Debug, Error)]
pub enum CheckFailure {
    /// An assertion about observed cluster state did not hold
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// The cluster did not reach the expected state in time
    #[error("timed out after {after:?} waiting for {waiting_for}")]
    Timeout {
        /// What the check was waiting for
        waiting_for: String,
        /// The budget that elapsed
        after: Duration,
    },

    /// The target client returned an error the check could not absorb
    #[error(transparent)]
    Client(#[from] Error),

    /// The run was cancelled while the check was in progress
    #[error("cancelled")]
    Cancelled,
}

impl CheckFailure {
    /// Create an assertion failure
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }
}

/// Everything a check may use while it runs
#[derive(Clone)]
pub struct CheckContext {
    client: Arc<dyn TargetClient>,
    gateway_class_name: String,
    timeouts: TimeoutConfig,
    capabilities: Arc<CapabilityDeclaration>,
    cancel: CancellationToken,
    debug: bool,
}

impl CheckContext {
    /// Build a context for one run
    pub fn new(
        client: Arc<dyn TargetClient>,
        gateway_class_name: impl Into<String>,
        timeouts: TimeoutConfig,
        capabilities: Arc<CapabilityDeclaration>,
        cancel: CancellationToken,
        debug: bool,
    ) -> Self {
        Self {
            client,
            gateway_class_name: gateway_class_name.into(),
            timeouts,
            capabilities,
            cancel,
            debug,
        }
    }

    /// Client for the cluster under test
    pub fn client(&self) -> &dyn TargetClient {
        self.client.as_ref()
    }

    /// GatewayClass under test
    pub fn gateway_class_name(&self) -> &str {
        &self.gateway_class_name
    }

    /// Time budgets for polling
    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// Declared supported and exempt features
    pub fn capabilities(&self) -> &CapabilityDeclaration {
        &self.capabilities
    }

    /// Cancellation signal for the run
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether assertions gated on `feature` must be checked
    pub fn asserts(&self, feature: &str) -> bool {
        self.capabilities.asserts(feature)
    }

    /// Apply a resource the check owns, bounded by the create timeout
    pub async fn apply(&self, manifest: &Manifest) -> std::result::Result<(), CheckFailure> {
        let limit = self.timeouts.create_timeout;
        match tokio::time::timeout(limit, self.client.apply(manifest)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CheckFailure::Timeout {
                waiting_for: format!("apply of {}", manifest.reference()),
                after: limit,
            }),
        }
    }

    /// Delete a resource the check owns, bounded by the delete timeout
    pub async fn delete(&self, resource: &ResourceRef) -> Result<bool> {
        bounded(
            self.timeouts.delete_timeout,
            &format!("delete {}", resource),
            self.client.delete(resource),
        )
        .await
    }

    async fn get(&self, resource: &ResourceRef) -> Result<Option<Value>> {
        bounded(
            self.timeouts.get_timeout,
            &format!("get {}", resource),
            self.client.get(resource),
        )
        .await
    }

    /// Poll a resource until `predicate` accepts it or `timeout` elapses
    ///
    /// A missing resource counts as not yet matching. In debug mode a
    /// timeout carries the last observed `status` of the resource.
    pub async fn wait_for_resource<P>(
        &self,
        resource: &ResourceRef,
        timeout: Duration,
        description: &str,
        predicate: P,
    ) -> std::result::Result<(), CheckFailure>
    where
        P: Fn(&Value) -> bool,
    {
        let predicate = &predicate;
        let result = poll_until(
            &self.cancel,
            timeout,
            self.timeouts.poll_interval,
            format!("{} on {}", description, resource),
            || async move { Ok(self.get(resource).await?.map(|v| predicate(&v)).unwrap_or(false)) },
        )
        .await;

        match result {
            Err(CheckFailure::Timeout { waiting_for, after }) if self.debug => {
                let observed = self.observed_status(resource).await;
                debug!(resource = %resource, observed = %observed, "condition not reached");
                Err(CheckFailure::Timeout {
                    waiting_for: format!("{}; observed status: {}", waiting_for, observed),
                    after,
                })
            }
            other => other,
        }
    }

    async fn observed_status(&self, resource: &ResourceRef) -> String {
        match self.get(resource).await {
            Ok(Some(value)) => value
                .get("status")
                .map(Value::to_string)
                .unwrap_or_else(|| "<none>".to_string()),
            Ok(None) => "<resource not found>".to_string(),
            Err(e) => format!("<unavailable: {}>", e),
        }
    }
}

/// Capability interface every conformance check implements
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConformanceCheck: Send + Sync {
    /// Run the check against the cluster under test
    async fn check(&self, ctx: &CheckContext) -> std::result::Result<(), CheckFailure>;
}

/// One registered conformance check
#[derive(Clone)]
pub struct TestCase {
    short_name: String,
    description: String,
    features: FeatureSet,
    check: Arc<dyn ConformanceCheck>,
}

impl TestCase {
    /// Create a case that requires no features
    pub fn new(
        short_name: impl Into<String>,
        description: impl Into<String>,
        check: Arc<dyn ConformanceCheck>,
    ) -> Self {
        Self {
            short_name: short_name.into(),
            description: description.into(),
            features: FeatureSet::new(),
            check,
        }
    }

    /// Declare the features this case requires
    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    /// Stable identifier used for exclusion and reporting
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Human-readable description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Features required for the case to be meaningful
    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// The executable check
    pub fn check(&self) -> &Arc<dyn ConformanceCheck> {
        &self.check
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("short_name", &self.short_name)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

/// Immutable, ordered collection of test cases with unique short names
#[derive(Debug)]
pub struct TestRegistry {
    cases: Vec<TestCase>,
}

impl TestRegistry {
    /// Build a registry, rejecting empty or duplicate short names
    pub fn new(cases: Vec<TestCase>) -> Result<Self> {
        let mut seen = HashSet::new();
        for case in &cases {
            if case.short_name.is_empty() {
                return Err(Error::validation("registry", "test short name must not be empty"));
            }
            if !seen.insert(case.short_name.as_str()) {
                return Err(Error::validation(
                    "registry",
                    format!("duplicate test short name '{}'", case.short_name),
                ));
            }
        }
        Ok(Self { cases })
    }

    /// Cases in registration order
    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.iter()
    }

    /// Look up a case by short name
    pub fn get(&self, short_name: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.short_name == short_name)
    }

    /// Whether a short name is registered
    pub fn contains(&self, short_name: &str) -> bool {
        self.get(short_name).is_some()
    }

    /// Number of registered cases
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Short names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.cases.iter().map(|c| c.short_name.as_str()).collect()
    }
}
