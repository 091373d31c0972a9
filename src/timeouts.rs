//! Time budgets shared by every conformance check
//!
//! Defaults follow the upstream Gateway API conformance suite. Checks read
//! the budget matching the state they wait for; the controller itself never
//! imposes a global timeout.

use std::time::Duration;

use crate::{Error, Result};

/// Named time budgets for one run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Time allowed for a single apply
    pub create_timeout: Duration,
    /// Time allowed for a single delete
    pub delete_timeout: Duration,
    /// Time allowed for a single read
    pub get_timeout: Duration,
    /// Time for the GatewayClass under test to be accepted
    pub gateway_class_must_be_accepted: Duration,
    /// Time for an HTTPRoute to report an expected condition
    pub http_route_must_have_condition: Duration,
    /// Time for any mutation to become visible in status
    pub max_time_to_consistency: Duration,
    /// Time for base namespaces and gateways to become ready during setup
    pub namespaces_must_be_ready: Duration,
    /// Interval between status polls
    pub poll_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            create_timeout: Duration::from_secs(60),
            delete_timeout: Duration::from_secs(10),
            get_timeout: Duration::from_secs(10),
            gateway_class_must_be_accepted: Duration::from_secs(180),
            http_route_must_have_condition: Duration::from_secs(60),
            max_time_to_consistency: Duration::from_secs(30),
            namespaces_must_be_ready: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl TimeoutConfig {
    /// Override the consistency budget
    pub fn with_max_time_to_consistency(mut self, timeout: Duration) -> Self {
        self.max_time_to_consistency = timeout;
        self
    }

    /// Override the setup readiness budget
    pub fn with_namespaces_must_be_ready(mut self, timeout: Duration) -> Self {
        self.namespaces_must_be_ready = timeout;
        self
    }

    /// Override the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Reject zero budgets, which would make every wait fail instantly
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("create_timeout", self.create_timeout),
            ("delete_timeout", self.delete_timeout),
            ("get_timeout", self.get_timeout),
            (
                "gateway_class_must_be_accepted",
                self.gateway_class_must_be_accepted,
            ),
            (
                "http_route_must_have_condition",
                self.http_route_must_have_condition,
            ),
            ("max_time_to_consistency", self.max_time_to_consistency),
            ("namespaces_must_be_ready", self.namespaces_must_be_ready),
            ("poll_interval", self.poll_interval),
        ];
        for (field, value) in named {
            if value.is_zero() {
                return Err(Error::validation(
                    format!("timeouts.{}", field),
                    "must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}
