//! Gateway API resource types used by the suite and the built-in checks
//!
//! Only the fields conformance checks set are modelled. Every resource type
//! implements `HasApiResource` and converts to a [`Manifest`] for the
//! target client with [`to_manifest`].

use k8s_openapi::api::core::v1::{Namespace, Service, ServicePort, ServiceSpec};
use serde::{Deserialize, Serialize};

use crate::client::Manifest;
use crate::client::schema::GATEWAY_API_GROUP;
use crate::kube_utils::{HasApiResource, ObjectMeta};
use crate::{Error, Result};

/// Convert any serializable resource into a manifest
pub fn to_manifest<T: Serialize>(resource: &T) -> Result<Manifest> {
    let body = serde_json::to_value(resource).map_err(|e| Error::serialization(e.to_string()))?;
    Manifest::from_value(body)
}

// =============================================================================
// Macro for default serde functions
// =============================================================================

/// Implements default_api_version() and default_kind() for types
/// implementing HasApiResource.
macro_rules! impl_api_defaults {
    ($type:ty) => {
        impl $type {
            fn default_api_version() -> String {
                <Self as HasApiResource>::API_VERSION.to_string()
            }
            fn default_kind() -> String {
                <Self as HasApiResource>::KIND.to_string()
            }
        }
    };
}

// =============================================================================
// Gateway
// =============================================================================

/// Kubernetes Gateway API Gateway resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    /// API version (gateway.networking.k8s.io/v1beta1)
    #[serde(default = "Gateway::default_api_version")]
    pub api_version: String,
    /// Resource kind (Gateway)
    #[serde(default = "Gateway::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Gateway specification
    pub spec: GatewaySpec,
}

impl HasApiResource for Gateway {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1beta1";
    const KIND: &'static str = "Gateway";
}

impl_api_defaults!(Gateway);

impl Gateway {
    /// Create a new Gateway
    pub fn new(metadata: ObjectMeta, spec: GatewaySpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// Gateway spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// GatewayClass under test
    pub gateway_class_name: String,
    /// Listener configurations
    pub listeners: Vec<GatewayListener>,
}

/// Gateway listener configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayListener {
    /// Listener name
    pub name: String,
    /// Optional hostname filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Port number
    pub port: u16,
    /// Protocol (HTTP, HTTPS, TLS, TCP)
    pub protocol: String,
    /// TLS configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<GatewayTlsConfig>,
    /// Allowed routes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_routes: Option<AllowedRoutes>,
}

impl GatewayListener {
    /// Plain HTTP listener
    pub fn http(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            hostname: None,
            port,
            protocol: "HTTP".to_string(),
            tls: None,
            allowed_routes: None,
        }
    }

    /// TLS passthrough listener
    pub fn tls_passthrough(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            hostname: None,
            port,
            protocol: "TLS".to_string(),
            tls: Some(GatewayTlsConfig {
                mode: "Passthrough".to_string(),
                certificate_refs: Vec::new(),
            }),
            allowed_routes: None,
        }
    }

    /// Restrict the listener to a hostname
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Set which routes may attach
    pub fn with_allowed_routes(mut self, allowed: AllowedRoutes) -> Self {
        self.allowed_routes = Some(allowed);
        self
    }
}

/// Gateway TLS configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTlsConfig {
    /// TLS mode (Terminate, Passthrough)
    pub mode: String,
    /// Certificate references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificate_refs: Vec<CertificateRef>,
}

/// Reference to a TLS certificate secret
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRef {
    /// Resource kind (default: Secret)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Secret name
    pub name: String,
}

/// Allowed routes for a gateway listener
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllowedRoutes {
    /// Namespace selector
    pub namespaces: RouteNamespaces,
    /// Route kinds allowed to attach; empty means the listener's defaults
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<RouteGroupKind>,
}

impl AllowedRoutes {
    /// Routes allowed only from the same namespace as the Gateway
    pub fn same_namespace() -> Self {
        Self::from_namespaces("Same")
    }

    /// Routes allowed from every namespace
    pub fn all_namespaces() -> Self {
        Self::from_namespaces("All")
    }

    fn from_namespaces(from: &str) -> Self {
        Self {
            namespaces: RouteNamespaces {
                from: from.to_string(),
            },
            kinds: Vec::new(),
        }
    }

    /// Restrict attachment to a single route kind
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kinds.push(RouteGroupKind {
            group: Some(GATEWAY_API_GROUP.to_string()),
            kind: kind.into(),
        });
        self
    }
}

/// Route namespace selector
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteNamespaces {
    /// Namespace selection mode (Same, All, Selector)
    pub from: String,
}

/// Group and kind of an attachable route
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteGroupKind {
    /// API group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Route kind
    pub kind: String,
}

// =============================================================================
// HTTPRoute
// =============================================================================

/// Kubernetes Gateway API HTTPRoute resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// API version (gateway.networking.k8s.io/v1beta1)
    #[serde(default = "HttpRoute::default_api_version")]
    pub api_version: String,
    /// Resource kind (HTTPRoute)
    #[serde(default = "HttpRoute::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// HTTPRoute specification
    pub spec: HttpRouteSpec,
}

impl HasApiResource for HttpRoute {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1beta1";
    const KIND: &'static str = "HTTPRoute";
}

impl_api_defaults!(HttpRoute);

impl HttpRoute {
    /// Create a new HTTPRoute
    pub fn new(metadata: ObjectMeta, spec: HttpRouteSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// HTTPRoute spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    /// Parent gateway references
    pub parent_refs: Vec<ParentRef>,
    /// Hostnames to match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    /// Routing rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<HttpRouteRule>,
}

/// Parent reference for route resources
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    /// API group (gateway.networking.k8s.io)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Resource kind (Gateway)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Gateway name
    pub name: String,
    /// Gateway namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Listener section name to bind to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl ParentRef {
    /// Reference a Gateway by name and namespace
    pub fn gateway(name: &str, namespace: &str) -> Self {
        Self {
            group: Some(GATEWAY_API_GROUP.to_string()),
            kind: Some("Gateway".to_string()),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            section_name: None,
        }
    }

    /// Bind to a single listener
    pub fn with_section(mut self, section_name: impl Into<String>) -> Self {
        self.section_name = Some(section_name.into());
        self
    }
}

/// HTTPRoute rule
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteRule {
    /// Request matches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<HttpRouteMatch>,
    /// Backend references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_refs: Vec<BackendRef>,
}

impl HttpRouteRule {
    /// Rule forwarding everything to one backend
    pub fn to_backend(backend: BackendRef) -> Self {
        Self {
            matches: Vec::new(),
            backend_refs: vec![backend],
        }
    }

    /// Add a request match
    pub fn with_match(mut self, m: HttpRouteMatch) -> Self {
        self.matches.push(m);
        self
    }
}

/// HTTP route match
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteMatch {
    /// Path match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<HttpPathMatch>,
    /// Header matches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HttpHeaderMatch>,
    /// Query parameter matches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_params: Vec<HttpQueryParamMatch>,
    /// HTTP method match (GET, POST, etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl HttpRouteMatch {
    /// Match a path prefix
    pub fn path_prefix(value: impl Into<String>) -> Self {
        Self::path("PathPrefix", value)
    }

    /// Match an exact path
    pub fn exact_path(value: impl Into<String>) -> Self {
        Self::path("Exact", value)
    }

    fn path(type_: &str, value: impl Into<String>) -> Self {
        Self {
            path: Some(HttpPathMatch {
                type_: type_.to_string(),
                value: value.into(),
            }),
            ..Default::default()
        }
    }

    /// Match an exact header value
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            headers: vec![HttpHeaderMatch {
                name: name.into(),
                value: value.into(),
                type_: Some("Exact".to_string()),
            }],
            ..Default::default()
        }
    }

    /// Match an exact query parameter value
    pub fn query_param(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            query_params: vec![HttpQueryParamMatch {
                name: name.into(),
                value: value.into(),
                type_: Some("Exact".to_string()),
            }],
            ..Default::default()
        }
    }

    /// Match a request method
    pub fn method(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            ..Default::default()
        }
    }
}

/// HTTP path match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpPathMatch {
    /// Match type (PathPrefix, Exact)
    #[serde(rename = "type")]
    pub type_: String,
    /// Path value
    pub value: String,
}

/// HTTP header match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpHeaderMatch {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
    /// Match type (Exact or RegularExpression)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

/// HTTP query parameter match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpQueryParamMatch {
    /// Parameter name
    pub name: String,
    /// Parameter value
    pub value: String,
    /// Match type (Exact or RegularExpression)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

/// Backend reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
    /// API group; empty for core Services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Resource kind (Service)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Backend name
    pub name: String,
    /// Backend namespace, for cross-namespace references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Backend port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl BackendRef {
    /// Reference a Service in the route's namespace
    pub fn service(name: impl Into<String>, port: u16) -> Self {
        Self {
            group: None,
            kind: None,
            name: name.into(),
            namespace: None,
            port: Some(port),
        }
    }

    /// Point the reference at another namespace
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Override the referenced group and kind
    pub fn with_group_kind(mut self, group: impl Into<String>, kind: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self.kind = Some(kind.into());
        self
    }
}

// =============================================================================
// TLSRoute
// =============================================================================

/// Kubernetes Gateway API TLSRoute resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsRoute {
    /// API version (gateway.networking.k8s.io/v1alpha2)
    #[serde(default = "TlsRoute::default_api_version")]
    pub api_version: String,
    /// Resource kind (TLSRoute)
    #[serde(default = "TlsRoute::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// TLSRoute specification
    pub spec: TlsRouteSpec,
}

impl HasApiResource for TlsRoute {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1alpha2";
    const KIND: &'static str = "TLSRoute";
}

impl_api_defaults!(TlsRoute);

impl TlsRoute {
    /// Create a new TLSRoute
    pub fn new(metadata: ObjectMeta, spec: TlsRouteSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// TLSRoute spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsRouteSpec {
    /// Parent gateway references
    pub parent_refs: Vec<ParentRef>,
    /// SNI hostnames to match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    /// Routing rules
    pub rules: Vec<TlsRouteRule>,
}

/// TLSRoute rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsRouteRule {
    /// Backend references
    pub backend_refs: Vec<BackendRef>,
}

// =============================================================================
// ReferenceGrant
// =============================================================================

/// Kubernetes Gateway API ReferenceGrant resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrant {
    /// API version (gateway.networking.k8s.io/v1beta1)
    #[serde(default = "ReferenceGrant::default_api_version")]
    pub api_version: String,
    /// Resource kind (ReferenceGrant)
    #[serde(default = "ReferenceGrant::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// ReferenceGrant specification
    pub spec: ReferenceGrantSpec,
}

impl HasApiResource for ReferenceGrant {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1beta1";
    const KIND: &'static str = "ReferenceGrant";
}

impl_api_defaults!(ReferenceGrant);

impl ReferenceGrant {
    /// Allow HTTPRoutes in `from_namespace` to reference Services in the
    /// grant's namespace
    pub fn http_routes_to_services(metadata: ObjectMeta, from_namespace: &str) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec: ReferenceGrantSpec {
                from: vec![ReferenceGrantFrom {
                    group: GATEWAY_API_GROUP.to_string(),
                    kind: HttpRoute::KIND.to_string(),
                    namespace: from_namespace.to_string(),
                }],
                to: vec![ReferenceGrantTo {
                    group: String::new(),
                    kind: "Service".to_string(),
                    name: None,
                }],
            },
        }
    }
}

/// ReferenceGrant spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrantSpec {
    /// Referrers the grant trusts
    pub from: Vec<ReferenceGrantFrom>,
    /// Targets that may be referenced
    pub to: Vec<ReferenceGrantTo>,
}

/// Trusted referrer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrantFrom {
    /// Referrer API group
    pub group: String,
    /// Referrer kind
    pub kind: String,
    /// Referrer namespace
    pub namespace: String,
}

/// Referenceable target
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrantTo {
    /// Target API group; empty for core
    pub group: String,
    /// Target kind
    pub kind: String,
    /// Optional target name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// =============================================================================
// Core resources
// =============================================================================

/// A labelled Namespace
pub fn namespace(name: &str) -> Namespace {
    let meta = ObjectMeta::cluster_scoped(name);
    Namespace {
        metadata: kube::api::ObjectMeta {
            name: Some(meta.name),
            labels: Some(meta.labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A ClusterIP Service selecting pods labelled `app=<name>`
pub fn backend_service(name: &str, namespace: &str, port: u16) -> Service {
    let meta = ObjectMeta::new(name, namespace);
    Service {
        metadata: kube::api::ObjectMeta {
            name: Some(meta.name),
            namespace: meta.namespace,
            labels: Some(meta.labels),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(std::collections::BTreeMap::from([(
                "app".to_string(),
                name.to_string(),
            )])),
            ports: Some(vec![ServicePort {
                port: i32::from(port),
                target_port: Some(
                    k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(3000),
                ),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_serializes_with_listener_route_policy() {
        let gw = Gateway::new(
            ObjectMeta::new("same-namespace", "gateway-conformance-infra"),
            GatewaySpec {
                gateway_class_name: "envoy".to_string(),
                listeners: vec![GatewayListener::http("http", 80)
                    .with_allowed_routes(AllowedRoutes::same_namespace())],
            },
        );
        let value = serde_json::to_value(&gw).unwrap();
        assert_eq!(value["apiVersion"], "gateway.networking.k8s.io/v1beta1");
        assert_eq!(value["spec"]["gatewayClassName"], "envoy");
        assert_eq!(
            value["spec"]["listeners"][0]["allowedRoutes"]["namespaces"]["from"],
            "Same"
        );
        assert!(value["spec"]["listeners"][0].get("tls").is_none());
    }

    #[test]
    fn http_route_match_uses_wire_names() {
        let rule = HttpRouteRule::to_backend(BackendRef::service("infra-backend-v1", 8080))
            .with_match(HttpRouteMatch::query_param("animal", "whale"));
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["matches"][0]["queryParams"][0]["name"], "animal");
        assert_eq!(value["matches"][0]["queryParams"][0]["type"], "Exact");
        assert_eq!(value["backendRefs"][0]["port"], 8080);
        assert!(value["backendRefs"][0].get("namespace").is_none());
    }

    #[test]
    fn to_manifest_carries_identity() {
        let route = HttpRoute::new(
            ObjectMeta::new("web", "gateway-conformance-infra"),
            HttpRouteSpec::default(),
        );
        let manifest = to_manifest(&route).unwrap();
        assert_eq!(manifest.reference().kind, "HTTPRoute");
        assert_eq!(
            manifest.reference().namespace.as_deref(),
            Some("gateway-conformance-infra")
        );
    }

    #[test]
    fn core_resources_serialize_with_type_meta() {
        let manifest = to_manifest(&namespace("gateway-conformance-infra")).unwrap();
        assert_eq!(manifest.reference().api_version, "v1");
        assert_eq!(manifest.reference().kind, "Namespace");
        assert!(manifest.reference().namespace.is_none());

        let svc = to_manifest(&backend_service("web-backend", "gateway-conformance-web-backend", 8080))
            .unwrap();
        assert_eq!(svc.reference().kind, "Service");
        assert_eq!(svc.body()["spec"]["ports"][0]["port"], 8080);
    }

    #[test]
    fn reference_grant_trusts_routes_from_one_namespace() {
        let grant = ReferenceGrant::http_routes_to_services(
            ObjectMeta::new("allow-infra", "gateway-conformance-web-backend"),
            "gateway-conformance-infra",
        );
        let value = serde_json::to_value(&grant).unwrap();
        assert_eq!(value["spec"]["from"][0]["kind"], "HTTPRoute");
        assert_eq!(value["spec"]["to"][0]["group"], "");
    }
}
