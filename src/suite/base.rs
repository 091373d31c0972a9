//! Shared base resources every conformance check relies on
//!
//! Three namespaces, one backend Service per namespace, and two Gateways in
//! the infra namespace using the GatewayClass under test. Checks may attach
//! routes to the Gateways but never modify or delete anything created here.

use serde_json::Value;

use crate::client::{Manifest, ResourceRef};
use crate::gateway_api::{
    backend_service, namespace, to_manifest, AllowedRoutes, Gateway, GatewayListener, GatewaySpec,
};
use crate::kube_utils::{resource_condition, HasApiResource, ObjectMeta, STATUS_TRUE};
use crate::Result;

/// Namespace holding the base Gateways and the infra backend
pub const INFRA_NAMESPACE: &str = "gateway-conformance-infra";
/// Namespace of the app backend
pub const APP_BACKEND_NAMESPACE: &str = "gateway-conformance-app-backend";
/// Namespace of the web backend
pub const WEB_BACKEND_NAMESPACE: &str = "gateway-conformance-web-backend";

/// Gateway accepting routes only from the infra namespace
pub const SAME_NAMESPACE_GATEWAY: &str = "same-namespace";
/// Gateway accepting routes from every namespace
pub const ALL_NAMESPACES_GATEWAY: &str = "all-namespaces";

/// Backend Service in the infra namespace
pub const INFRA_BACKEND: &str = "infra-backend-v1";
/// Backend Service in the app backend namespace
pub const APP_BACKEND: &str = "app-backend-v1";
/// Backend Service in the web backend namespace
pub const WEB_BACKEND: &str = "web-backend";
/// Port every backend Service exposes
pub const BACKEND_PORT: u16 = 8080;

/// HTTP listener port on the base Gateways
pub const HTTP_LISTENER_PORT: u16 = 80;

/// Base resources in creation order
pub fn base_manifests(gateway_class_name: &str) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();
    for ns in [INFRA_NAMESPACE, APP_BACKEND_NAMESPACE, WEB_BACKEND_NAMESPACE] {
        manifests.push(to_manifest(&namespace(ns))?);
    }
    for (name, ns) in [
        (INFRA_BACKEND, INFRA_NAMESPACE),
        (APP_BACKEND, APP_BACKEND_NAMESPACE),
        (WEB_BACKEND, WEB_BACKEND_NAMESPACE),
    ] {
        manifests.push(to_manifest(&backend_service(name, ns, BACKEND_PORT))?);
    }
    for (name, allowed) in [
        (SAME_NAMESPACE_GATEWAY, AllowedRoutes::same_namespace()),
        (ALL_NAMESPACES_GATEWAY, AllowedRoutes::all_namespaces()),
    ] {
        let gateway = Gateway::new(
            ObjectMeta::new(name, INFRA_NAMESPACE),
            GatewaySpec {
                gateway_class_name: gateway_class_name.to_string(),
                listeners: vec![
                    GatewayListener::http("http", HTTP_LISTENER_PORT).with_allowed_routes(allowed)
                ],
            },
        );
        manifests.push(to_manifest(&gateway)?);
    }
    Ok(manifests)
}

/// References to the base Gateways
pub fn base_gateways() -> Vec<ResourceRef> {
    [SAME_NAMESPACE_GATEWAY, ALL_NAMESPACES_GATEWAY]
        .into_iter()
        .map(|name| {
            ResourceRef::namespaced(Gateway::API_VERSION, Gateway::KIND, INFRA_NAMESPACE, name)
        })
        .collect()
}

/// Whether a Gateway reports `Accepted=True`, or the older `Ready=True`
pub fn gateway_is_accepted(gateway: &Value) -> bool {
    ["Accepted", "Ready"].into_iter().any(|t| {
        resource_condition(gateway, t)
            .map(|c| c.status == STATUS_TRUE)
            .unwrap_or(false)
    })
}
