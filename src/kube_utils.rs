//! Shared Kubernetes utilities using kube-rs
//!
//! Client construction, `ApiResource` building for dynamically-typed Gateway
//! API objects, condition lookup in raw status JSON, and the cancellable
//! polling primitive checks use to wait for eventual consistency.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::registry::CheckFailure;
use crate::Error;

/// The "True" status value for conditions
pub const STATUS_TRUE: &str = "True";
/// The "False" status value for conditions
pub const STATUS_FALSE: &str = "False";

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// ObjectMeta - metadata for resources the suite creates
// =============================================================================

/// Kubernetes metadata for typed resources built by the suite and its checks.
///
/// Adds the conformance management labels on construction so leftover
/// resources can be found with a label selector.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace; None for cluster-scoped kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Create namespaced metadata with the conformance labels
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let mut meta = Self::cluster_scoped(name);
        meta.namespace = Some(namespace.into());
        meta
    }

    /// Create cluster-scoped metadata with the conformance labels
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(
            crate::LABEL_MANAGED_BY.to_string(),
            crate::LABEL_MANAGED_BY_CONFORMANCE.to_string(),
        );
        Self {
            name: name.into(),
            namespace: None,
            labels,
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// HasApiResource Trait
// =============================================================================

/// Trait for types that have a known API group, version, and kind.
///
/// # Example
/// ```ignore
/// impl HasApiResource for HttpRoute {
///     const API_VERSION: &'static str = "gateway.networking.k8s.io/v1beta1";
///     const KIND: &'static str = "HTTPRoute";
/// }
///
/// let ar = HttpRoute::api_resource();
/// ```
pub trait HasApiResource {
    /// Full API version (e.g., "gateway.networking.k8s.io/v1beta1", "v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "HTTPRoute")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

// =============================================================================
// Client construction
// =============================================================================

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
///
/// Failing to find or load configuration is a [`Error::ClusterConfig`];
/// failing to turn a loaded configuration into a client is a
/// [`Error::ClientConstruction`].
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::cluster_config(format!(
                    "failed to read kubeconfig {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::cluster_config(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::cluster_config(format!("failed to infer config: {}", e)))?,
    };
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config)
        .map_err(|e| Error::client_construction(format!("failed to create client: {}", e)))
}

// =============================================================================
// ApiResource building
// =============================================================================

/// Split an apiVersion into (group, version); core types have an empty group
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Build an ApiResource from a known apiVersion and kind.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Known irregular plurals
const KIND_PLURALS: &[(&str, &str)] = &[
    ("gatewayclass", "gatewayclasses"),
    ("endpoints", "endpoints"),
];

/// Pluralize a Kubernetes resource kind
///
/// Uses a lookup table for irregular types, falling back to simple
/// pluralization rules.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    for (singular, plural) in KIND_PLURALS {
        if *singular == lower {
            return (*plural).to_string();
        }
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

// =============================================================================
// Conditions
// =============================================================================

/// A status condition read from raw resource JSON
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionView {
    /// Condition status ("True", "False", "Unknown")
    pub status: String,
    /// Machine-readable reason, if set
    pub reason: Option<String>,
}

/// Find a condition by type in a `conditions` array
pub fn find_condition(conditions: Option<&Value>, condition_type: &str) -> Option<ConditionView> {
    conditions?
        .as_array()?
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(condition_type))
        .map(|c| ConditionView {
            status: c
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            reason: c.get("reason").and_then(Value::as_str).map(str::to_string),
        })
}

/// Find a condition on a resource's top-level `status.conditions`
pub fn resource_condition(resource: &Value, condition_type: &str) -> Option<ConditionView> {
    find_condition(resource.pointer("/status/conditions"), condition_type)
}

/// Find a condition a route reports for one of its parent Gateways
///
/// Routes publish per-parent status under `status.parents[]`, keyed by
/// `parentRef.name`.
pub fn route_parent_condition(
    route: &Value,
    parent_name: &str,
    condition_type: &str,
) -> Option<ConditionView> {
    route
        .pointer("/status/parents")?
        .as_array()?
        .iter()
        .filter(|p| p.pointer("/parentRef/name").and_then(Value::as_str) == Some(parent_name))
        .find_map(|p| find_condition(p.get("conditions"), condition_type))
}

// =============================================================================
// Polling
// =============================================================================

/// Poll until a condition is met, the timeout elapses, or the run is cancelled
///
/// `check_fn` returns `Ok(true)` when the condition is met and `Ok(false)` to
/// keep polling. Errors are treated as transient and polling continues; the
/// last one is included in the timeout failure.
pub async fn poll_until<F, Fut>(
    cancel: &CancellationToken,
    timeout: Duration,
    poll_interval: Duration,
    description: impl Into<String>,
    mut check_fn: F,
) -> Result<(), CheckFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let start = Instant::now();
    let description = description.into();
    let mut last_error: Option<String> = None;

    loop {
        if cancel.is_cancelled() {
            return Err(CheckFailure::Cancelled);
        }
        if start.elapsed() > timeout {
            return Err(CheckFailure::Timeout {
                waiting_for: match last_error {
                    Some(e) => format!("{} (last error: {})", description, e),
                    None => description,
                },
                after: timeout,
            });
        }

        match check_fn().await {
            Ok(true) => return Ok(()),
            Ok(false) => trace!(waiting_for = %description, "condition not yet met"),
            Err(e) => {
                trace!(waiting_for = %description, error = %e, "poll check failed, retrying");
                last_error = Some(e.to_string());
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(CheckFailure::Cancelled),
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

/// Bound a single client call
///
/// An elapsed limit becomes a retryable [`Error::Internal`] naming the
/// operation, so pollers and retry loops treat it like any transient error.
pub async fn bounded<T, Fut>(limit: Duration, operation: &str, call: Fut) -> Result<T, Error>
where
    Fut: Future<Output = Result<T, Error>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::internal_with_context(
            operation,
            format!("timed out after {:?}", limit),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_pluralize_gateway_kinds() {
        assert_eq!(pluralize_kind("GatewayClass"), "gatewayclasses");
        assert_eq!(pluralize_kind("Gateway"), "gateways");
        assert_eq!(pluralize_kind("HTTPRoute"), "httproutes");
        assert_eq!(pluralize_kind("TLSRoute"), "tlsroutes");
        assert_eq!(pluralize_kind("ReferenceGrant"), "referencegrants");
        assert_eq!(pluralize_kind("Namespace"), "namespaces");
        assert_eq!(pluralize_kind("Service"), "services");
        assert_eq!(pluralize_kind("Policy"), "policies");
    }

    #[test]
    fn test_parse_api_version() {
        assert_eq!(
            parse_api_version("gateway.networking.k8s.io/v1beta1"),
            ("gateway.networking.k8s.io".to_string(), "v1beta1".to_string())
        );
        assert_eq!(
            parse_api_version("v1"),
            (String::new(), "v1".to_string())
        );
    }

    #[test]
    fn test_build_api_resource() {
        let ar = build_api_resource("gateway.networking.k8s.io/v1alpha2", "TLSRoute");
        assert_eq!(ar.group, "gateway.networking.k8s.io");
        assert_eq!(ar.version, "v1alpha2");
        assert_eq!(ar.plural, "tlsroutes");
        assert_eq!(ar.api_version, "gateway.networking.k8s.io/v1alpha2");
    }

    #[test]
    fn route_parent_condition_matches_by_parent_name() {
        let route = json!({
            "status": {
                "parents": [
                    {
                        "parentRef": {"name": "other"},
                        "conditions": [{"type": "Accepted", "status": "False"}]
                    },
                    {
                        "parentRef": {"name": "same-namespace"},
                        "conditions": [
                            {"type": "Accepted", "status": "True", "reason": "Accepted"},
                            {"type": "ResolvedRefs", "status": "False", "reason": "BackendNotFound"}
                        ]
                    }
                ]
            }
        });
        let accepted = route_parent_condition(&route, "same-namespace", "Accepted").unwrap();
        assert_eq!(accepted.status, STATUS_TRUE);
        let refs = route_parent_condition(&route, "same-namespace", "ResolvedRefs").unwrap();
        assert_eq!(refs.reason.as_deref(), Some("BackendNotFound"));
        assert!(route_parent_condition(&route, "missing", "Accepted").is_none());
    }

    #[test]
    fn resource_condition_reads_top_level_status() {
        let gw = json!({"status": {"conditions": [{"type": "Accepted", "status": "True"}]}});
        assert_eq!(resource_condition(&gw, "Accepted").unwrap().status, "True");
        assert!(resource_condition(&json!({}), "Accepted").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_call_times_out_as_retryable_error() {
        let err = bounded(Duration::from_secs(10), "delete Gateway infra/gw", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, Error>(())
        })
        .await
        .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("timed out after 10s"));
        assert_eq!(err.context(), Some("delete Gateway infra/gw"));
    }

    #[tokio::test]
    async fn bounded_call_passes_through_results() {
        let value = bounded(Duration::from_secs(1), "get", async { Ok::<_, Error>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn poll_until_returns_once_condition_holds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = poll_until(
            &CancellationToken::new(),
            Duration::from_secs(5),
            Duration::from_millis(1),
            "third call",
            || {
                let c = c.clone();
                async move { Ok(c.fetch_add(1, Ordering::SeqCst) >= 2) }
            },
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn poll_until_times_out_with_last_error() {
        let result = poll_until(
            &CancellationToken::new(),
            Duration::from_millis(20),
            Duration::from_millis(5),
            "never",
            || async { Err(Error::internal("boom")) },
        )
        .await;
        match result {
            Err(CheckFailure::Timeout { waiting_for, .. }) => {
                assert!(waiting_for.contains("never"));
                assert!(waiting_for.contains("boom"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn poll_until_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = poll_until(
            &cancel,
            Duration::from_secs(60),
            Duration::from_secs(1),
            "cancelled",
            || async { Ok(false) },
        )
        .await;
        assert!(matches!(result, Err(CheckFailure::Cancelled)));
    }
}
