//! Schema registry for the target client
//!
//! A resource kind can only be read or written once its group/version has
//! been registered. Registration is keyed by `(apiVersion, kind)` and backed
//! by a `DashMap`, so lookups from concurrent checks never block each other.

use dashmap::DashMap;
use kube::discovery::ApiResource;
use tracing::debug;

use crate::kube_utils::build_api_resource;
use crate::{Error, Result};

/// Gateway API group
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

/// A Kubernetes API group and version
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupVersion {
    /// API group; empty for the core group
    pub group: &'static str,
    /// API version (e.g., "v1beta1")
    pub version: &'static str,
}

impl GroupVersion {
    /// The `apiVersion` string for this group/version
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// A group/version and the kinds it serves
#[derive(Clone, Copy, Debug)]
pub struct SchemaDefinition {
    /// Group and version of every kind below
    pub group_version: GroupVersion,
    /// Kinds served at this group/version
    pub kinds: &'static [&'static str],
}

/// Gateway API v1alpha2 kinds
pub const GATEWAY_V1ALPHA2: SchemaDefinition = SchemaDefinition {
    group_version: GroupVersion {
        group: GATEWAY_API_GROUP,
        version: "v1alpha2",
    },
    kinds: &[
        "GatewayClass",
        "Gateway",
        "HTTPRoute",
        "ReferenceGrant",
        "TLSRoute",
        "TCPRoute",
        "UDPRoute",
    ],
};

/// Gateway API v1beta1 kinds
pub const GATEWAY_V1BETA1: SchemaDefinition = SchemaDefinition {
    group_version: GroupVersion {
        group: GATEWAY_API_GROUP,
        version: "v1beta1",
    },
    kinds: &["GatewayClass", "Gateway", "HTTPRoute", "ReferenceGrant"],
};

/// Core kinds the suite creates for base infrastructure
pub const CORE_V1: SchemaDefinition = SchemaDefinition {
    group_version: GroupVersion {
        group: "",
        version: "v1",
    },
    kinds: &["Namespace", "Service"],
};

/// Registered `(apiVersion, kind)` pairs and their API resources
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entries: DashMap<(String, String), ApiResource>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every kind of a definition, returning how many were new
    ///
    /// Registering the same definition again is a no-op.
    pub fn register(&self, definition: &SchemaDefinition) -> usize {
        let api_version = definition.group_version.api_version();
        let mut added = 0;
        for kind in definition.kinds {
            let key = (api_version.clone(), (*kind).to_string());
            if !self.entries.contains_key(&key) {
                self.entries
                    .insert(key, build_api_resource(&api_version, kind));
                added += 1;
            }
        }
        debug!(api_version = %api_version, added, "registered schema");
        added
    }

    /// Resolve a registered kind to its API resource
    pub fn resolve(&self, api_version: &str, kind: &str) -> Result<ApiResource> {
        self.entries
            .get(&(api_version.to_string(), kind.to_string()))
            .map(|ar| ar.clone())
            .ok_or_else(|| Error::unregistered_kind(api_version, kind))
    }

    /// Whether a kind is registered at the given apiVersion
    pub fn is_registered(&self, api_version: &str, kind: &str) -> bool {
        self.entries
            .contains_key(&(api_version.to_string(), kind.to_string()))
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1BETA1: &str = "gateway.networking.k8s.io/v1beta1";
    const V1ALPHA2: &str = "gateway.networking.k8s.io/v1alpha2";

    #[test]
    fn registration_is_idempotent() {
        let registry = SchemaRegistry::new();
        assert_eq!(registry.register(&GATEWAY_V1BETA1), 4);
        assert_eq!(registry.register(&GATEWAY_V1BETA1), 0);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn both_gateway_versions_coexist() {
        let registry = SchemaRegistry::new();
        registry.register(&GATEWAY_V1ALPHA2);
        registry.register(&GATEWAY_V1BETA1);
        assert!(registry.is_registered(V1ALPHA2, "TLSRoute"));
        assert!(registry.is_registered(V1BETA1, "HTTPRoute"));
        assert!(registry.is_registered(V1ALPHA2, "HTTPRoute"));
        assert!(!registry.is_registered(V1BETA1, "TLSRoute"));
    }

    #[test]
    fn resolve_builds_plural_resource_names() {
        let registry = SchemaRegistry::new();
        registry.register(&GATEWAY_V1BETA1);
        let ar = registry.resolve(V1BETA1, "GatewayClass").unwrap();
        assert_eq!(ar.plural, "gatewayclasses");
        assert_eq!(ar.group, GATEWAY_API_GROUP);
    }

    #[test]
    fn unregistered_kind_is_rejected() {
        let registry = SchemaRegistry::new();
        registry.register(&GATEWAY_V1BETA1);
        let err = registry.resolve(V1BETA1, "TLSRoute").unwrap_err();
        assert!(matches!(err, Error::UnregisteredKind { .. }));
    }

    #[test]
    fn core_group_has_bare_api_version() {
        assert_eq!(CORE_V1.group_version.api_version(), "v1");
        assert_eq!(GATEWAY_V1ALPHA2.group_version.api_version(), V1ALPHA2);
    }
}
