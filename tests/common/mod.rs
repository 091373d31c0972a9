//! In-memory cluster for exercising the suite without Kubernetes

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use gateway_conformance::client::{Manifest, ResourceRef, TargetClient};
use gateway_conformance::exclusion::ExclusionList;
use gateway_conformance::features::CapabilityDeclaration;
use gateway_conformance::registry::{CheckContext, CheckFailure, ConformanceCheck, TestCase};
use gateway_conformance::suite::RunOptions;
use gateway_conformance::timeouts::TimeoutConfig;
use gateway_conformance::Result;

/// Cluster that stores applied objects and publishes accepting status
///
/// Gateways get `Accepted=True`; routes get `Accepted=True` and
/// `ResolvedRefs=True` for every parent they reference.
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<BTreeMap<String, Value>>,
    mutations: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Applies and deletes seen so far
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Stored objects as `Kind ns/name` keys
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn contains(&self, resource: &ResourceRef) -> bool {
        self.objects.lock().unwrap().contains_key(&resource.to_string())
    }

    fn with_status(body: &Value) -> Value {
        let mut body = body.clone();
        let kind = body["kind"].as_str().unwrap_or_default().to_string();
        if kind == "Gateway" {
            body["status"] = json!({"conditions": [
                {"type": "Accepted", "status": "True", "reason": "Accepted"}
            ]});
        } else if kind.ends_with("Route") {
            let parents: Vec<Value> = body["spec"]["parentRefs"]
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|p| {
                    json!({
                        "parentRef": {"name": p["name"]},
                        "conditions": [
                            {"type": "Accepted", "status": "True", "reason": "Accepted"},
                            {"type": "ResolvedRefs", "status": "True", "reason": "ResolvedRefs"}
                        ]
                    })
                })
                .collect();
            body["status"] = json!({ "parents": parents });
        }
        body
    }
}

#[async_trait]
impl TargetClient for FakeCluster {
    async fn apply(&self, manifest: &Manifest) -> Result<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(
            manifest.reference().to_string(),
            Self::with_status(manifest.body()),
        );
        Ok(())
    }

    async fn get(&self, resource: &ResourceRef) -> Result<Option<Value>> {
        Ok(self.objects.lock().unwrap().get(&resource.to_string()).cloned())
    }

    async fn delete(&self, resource: &ResourceRef) -> Result<bool> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .objects
            .lock()
            .unwrap()
            .remove(&resource.to_string())
            .is_some())
    }
}

/// Check that counts its invocations and always passes
#[derive(Default)]
pub struct CountingCheck {
    calls: AtomicUsize,
}

impl CountingCheck {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConformanceCheck for CountingCheck {
    async fn check(&self, _ctx: &CheckContext) -> std::result::Result<(), CheckFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Check that passes only when the feature's assertions are active
pub struct AssertsFeature(pub &'static str);

#[async_trait]
impl ConformanceCheck for AssertsFeature {
    async fn check(&self, ctx: &CheckContext) -> std::result::Result<(), CheckFailure> {
        if ctx.asserts(self.0) {
            Err(CheckFailure::assertion(format!("{} behavior not observed", self.0)))
        } else {
            Ok(())
        }
    }
}

pub fn case(name: &str, check: Arc<dyn ConformanceCheck>) -> TestCase {
    TestCase::new(name, format!("{name} test"), check)
}

pub fn fast_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        http_route_must_have_condition: Duration::from_millis(200),
        ..TimeoutConfig::default()
    }
    .with_max_time_to_consistency(Duration::from_millis(200))
    .with_namespaces_must_be_ready(Duration::from_millis(200))
    .with_poll_interval(Duration::from_millis(5))
}

pub fn options(cluster: Arc<FakeCluster>) -> RunOptions {
    RunOptions {
        client: cluster,
        gateway_class_name: "fake".to_string(),
        capabilities: CapabilityDeclaration::default(),
        exclusions: ExclusionList::new(),
        timeouts: fast_timeouts(),
        debug: false,
        cleanup_base_resources: true,
        run_test: None,
    }
}
