//! Target client: typed access to the cluster under test
//!
//! Checks and the suite talk to the cluster only through the [`TargetClient`]
//! trait, which is small enough to fake in memory. The production
//! implementation is [`KubeTargetClient`], created once per run by
//! [`bootstrap`].

mod live;
pub mod schema;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use tracing::info;

pub use live::KubeTargetClient;
pub use schema::{GroupVersion, SchemaDefinition, SchemaRegistry};

use crate::kube_utils::create_client;
use crate::{Error, Result};

/// Identifies a single resource in the target cluster
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// Full apiVersion (e.g., "gateway.networking.k8s.io/v1beta1")
    pub api_version: String,
    /// Resource kind (e.g., "HTTPRoute")
    pub kind: String,
    /// Resource name
    pub name: String,
    /// Namespace, or None for cluster-scoped kinds
    pub namespace: Option<String>,
}

impl ResourceRef {
    /// Reference a namespaced resource
    pub fn namespaced(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Reference a cluster-scoped resource
    pub fn cluster(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// A complete resource body ready for server-side apply
#[derive(Clone, Debug, PartialEq)]
pub struct Manifest {
    reference: ResourceRef,
    body: Value,
}

impl Manifest {
    /// Build a manifest from a full resource body
    ///
    /// The body must carry `apiVersion`, `kind` and `metadata.name`.
    pub fn from_value(body: Value) -> Result<Self> {
        let field = |pointer: &str| body.pointer(pointer).and_then(Value::as_str);
        let kind = field("/kind")
            .ok_or_else(|| Error::serialization("manifest is missing kind"))?
            .to_string();
        let api_version = field("/apiVersion")
            .ok_or_else(|| Error::serialization_for_kind(&kind, "manifest is missing apiVersion"))?
            .to_string();
        let name = field("/metadata/name")
            .ok_or_else(|| Error::serialization_for_kind(&kind, "manifest is missing metadata.name"))?
            .to_string();
        let namespace = field("/metadata/namespace").map(str::to_string);

        Ok(Self {
            reference: ResourceRef {
                api_version,
                kind,
                name,
                namespace,
            },
            body,
        })
    }

    /// The resource this manifest describes
    pub fn reference(&self) -> &ResourceRef {
        &self.reference
    }

    /// The full resource body
    pub fn body(&self) -> &Value {
        &self.body
    }
}

/// Create, read and delete resources in the cluster under test
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TargetClient: Send + Sync {
    /// Create or update a resource with server-side apply
    async fn apply(&self, manifest: &Manifest) -> Result<()>;

    /// Fetch a resource as JSON, or None if it doesn't exist
    async fn get(&self, resource: &ResourceRef) -> Result<Option<Value>>;

    /// Delete a resource, returning false if it was already gone
    async fn delete(&self, resource: &ResourceRef) -> Result<bool>;
}

/// Connect to the cluster under test and register the Gateway API schemas
///
/// Uses the given kubeconfig, or the standard inference chain when None.
/// Failures are fatal and never retried.
pub async fn bootstrap(kubeconfig: Option<&Path>) -> Result<KubeTargetClient> {
    let client = create_client(kubeconfig).await?;
    let target = KubeTargetClient::new(client, crate::FIELD_MANAGER);
    target.extend_schema(&schema::CORE_V1);
    target.extend_schema(&schema::GATEWAY_V1ALPHA2);
    target.extend_schema(&schema::GATEWAY_V1BETA1);
    info!(kinds = target.schemas().len(), "target client ready");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn manifest_reads_identity_from_body() {
        let manifest = Manifest::from_value(json!({
            "apiVersion": "gateway.networking.k8s.io/v1beta1",
            "kind": "HTTPRoute",
            "metadata": {"name": "web", "namespace": "gateway-conformance-infra"},
            "spec": {}
        }))
        .unwrap();
        assert_eq!(
            manifest.reference(),
            &ResourceRef::namespaced(
                "gateway.networking.k8s.io/v1beta1",
                "HTTPRoute",
                "gateway-conformance-infra",
                "web"
            )
        );
        assert_eq!(
            manifest.reference().to_string(),
            "HTTPRoute gateway-conformance-infra/web"
        );
    }

    #[test]
    fn manifest_without_name_is_rejected() {
        let err = Manifest::from_value(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn cluster_scoped_reference_display() {
        let r = ResourceRef::cluster("v1", "Namespace", "gateway-conformance-infra");
        assert_eq!(r.to_string(), "Namespace gateway-conformance-infra");
    }
}
