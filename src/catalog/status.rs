//! Status-level conformance checks
//!
//! A [`StatusConditionCheck`] applies the resources it owns, waits for the
//! implementation to publish the expected status conditions, and deletes
//! its resources again whatever the outcome.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{Manifest, ResourceRef};
use crate::gateway_api::Gateway;
use crate::kube_utils::{
    resource_condition, route_parent_condition, ConditionView, HasApiResource,
};
use crate::registry::{CheckContext, CheckFailure, ConformanceCheck};
use crate::timeouts::TimeoutConfig;
use crate::Result;

/// Where an expected condition is published
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConditionSource {
    /// `status.parents[]` entry of a route for the named parent Gateway
    RouteParent {
        /// The route
        route: ResourceRef,
        /// Name of the parent Gateway
        parent: String,
    },
    /// Top-level `status.conditions` of a resource
    Resource(ResourceRef),
}

impl ConditionSource {
    fn resource(&self) -> &ResourceRef {
        match self {
            ConditionSource::RouteParent { route, .. } => route,
            ConditionSource::Resource(r) => r,
        }
    }

    fn read(&self, value: &Value, condition_type: &str) -> Option<ConditionView> {
        match self {
            ConditionSource::RouteParent { parent, .. } => {
                route_parent_condition(value, parent, condition_type)
            }
            ConditionSource::Resource(_) => resource_condition(value, condition_type),
        }
    }
}

/// A status condition the implementation must eventually report
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expectation {
    source: ConditionSource,
    condition_type: &'static str,
    status: &'static str,
    reason: Option<&'static str>,
    gated_by: Option<&'static str>,
}

impl Expectation {
    /// Expect a route to report a condition for one parent Gateway
    pub fn route_parent(
        route: &ResourceRef,
        parent: &str,
        condition_type: &'static str,
        status: &'static str,
    ) -> Self {
        Self {
            source: ConditionSource::RouteParent {
                route: route.clone(),
                parent: parent.to_string(),
            },
            condition_type,
            status,
            reason: None,
            gated_by: None,
        }
    }

    /// Expect a resource to report a top-level condition
    pub fn resource(
        resource: &ResourceRef,
        condition_type: &'static str,
        status: &'static str,
    ) -> Self {
        Self {
            source: ConditionSource::Resource(resource.clone()),
            condition_type,
            status,
            reason: None,
            gated_by: None,
        }
    }

    /// Also require a specific reason
    pub fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Only assert when `feature` is supported and not exempt
    pub fn gated_by(mut self, feature: &'static str) -> Self {
        self.gated_by = Some(feature);
        self
    }

    /// Whether an observed resource satisfies this expectation
    pub fn is_met_by(&self, value: &Value) -> bool {
        match self.source.read(value, self.condition_type) {
            Some(c) => {
                c.status == self.status
                    && self.reason.map_or(true, |r| c.reason.as_deref() == Some(r))
            }
            None => false,
        }
    }

    /// Time allowed for the condition to appear
    ///
    /// Gateways owned by a check depend on the GatewayClass accepting them;
    /// every other resource gets the general consistency budget.
    pub fn timeout(&self, timeouts: &TimeoutConfig) -> Duration {
        match &self.source {
            ConditionSource::RouteParent { .. } => timeouts.http_route_must_have_condition,
            ConditionSource::Resource(r) if r.kind == Gateway::KIND => {
                timeouts.gateway_class_must_be_accepted
            }
            ConditionSource::Resource(_) => timeouts.max_time_to_consistency,
        }
    }

    fn describe(&self) -> String {
        let mut d = format!("{}={}", self.condition_type, self.status);
        if let Some(reason) = self.reason {
            d.push_str(&format!(" (reason {})", reason));
        }
        if let ConditionSource::RouteParent { parent, .. } = &self.source {
            d.push_str(&format!(" for parent {}", parent));
        }
        d
    }
}

/// Resources a check owns and the conditions it expects them to reach
#[derive(Clone, Debug, Default)]
pub struct Scenario {
    /// Resources applied in order and deleted in reverse
    pub resources: Vec<Manifest>,
    /// Conditions checked in order
    pub expectations: Vec<Expectation>,
}

/// Builds a scenario for the GatewayClass under test
pub type ScenarioBuilder = fn(gateway_class_name: &str) -> Result<Scenario>;

/// Data-driven check over route and gateway status conditions
pub struct StatusConditionCheck {
    build: ScenarioBuilder,
}

impl StatusConditionCheck {
    /// Wrap a scenario builder
    pub fn new(build: ScenarioBuilder) -> Self {
        Self { build }
    }

    async fn verify(
        &self,
        ctx: &CheckContext,
        scenario: &Scenario,
    ) -> std::result::Result<(), CheckFailure> {
        for manifest in &scenario.resources {
            ctx.apply(manifest).await?;
            debug!(resource = %manifest.reference(), "applied test resource");
        }

        for expectation in &scenario.expectations {
            if let Some(feature) = expectation.gated_by {
                if !ctx.asserts(feature) {
                    debug!(
                        feature,
                        expectation = %expectation.describe(),
                        "bypassing assertion for exempt feature"
                    );
                    continue;
                }
            }
            let timeout = expectation.timeout(ctx.timeouts());
            ctx.wait_for_resource(
                expectation.source.resource(),
                timeout,
                &expectation.describe(),
                |v| expectation.is_met_by(v),
            )
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ConformanceCheck for StatusConditionCheck {
    async fn check(&self, ctx: &CheckContext) -> std::result::Result<(), CheckFailure> {
        let scenario = (self.build)(ctx.gateway_class_name())?;
        let result = self.verify(ctx, &scenario).await;

        for manifest in scenario.resources.iter().rev() {
            if let Err(e) = ctx.delete(manifest.reference()).await {
                warn!(resource = %manifest.reference(), error = %e, "failed to delete test resource");
            }
        }
        result
    }
}
