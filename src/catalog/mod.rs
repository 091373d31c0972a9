//! Built-in conformance catalog
//!
//! Status-level Gateway API checks: each case creates its own routes (and,
//! where the scenario needs special listeners, its own Gateway), then waits
//! for the implementation to publish the expected `Accepted` and
//! `ResolvedRefs` conditions.

pub mod status;

use std::sync::Arc;

use crate::client::ResourceRef;
use crate::features::{well_known, FeatureSet};
use crate::gateway_api::{
    to_manifest, AllowedRoutes, BackendRef, Gateway, GatewayListener, GatewaySpec, HttpRoute,
    HttpRouteMatch, HttpRouteRule, HttpRouteSpec, ParentRef, ReferenceGrant, TlsRoute,
    TlsRouteRule, TlsRouteSpec,
};
use crate::kube_utils::{HasApiResource, ObjectMeta, STATUS_FALSE, STATUS_TRUE};
use crate::registry::{TestCase, TestRegistry};
use crate::suite::base::{
    ALL_NAMESPACES_GATEWAY, BACKEND_PORT, INFRA_BACKEND, INFRA_NAMESPACE, SAME_NAMESPACE_GATEWAY,
    WEB_BACKEND, WEB_BACKEND_NAMESPACE,
};
use crate::Result;
use status::{Expectation, Scenario, ScenarioBuilder, StatusConditionCheck};

const ACCEPTED: &str = "Accepted";
const RESOLVED_REFS: &str = "ResolvedRefs";

/// Every built-in case in registration order
pub fn builtin_registry() -> Result<TestRegistry> {
    let case = |name: &str, description: &str, build: ScenarioBuilder| {
        TestCase::new(name, description, Arc::new(StatusConditionCheck::new(build)))
    };
    let requires = |features: &[&'static str]| FeatureSet::from_static(features);

    TestRegistry::new(vec![
        case(
            "HTTPRouteSimpleSameNamespace",
            "A single HTTPRoute in the gateway-conformance-infra namespace attaches to a Gateway in the same namespace",
            simple_same_namespace,
        ),
        case(
            "HTTPRouteCrossNamespace",
            "A single HTTPRoute in the gateway-conformance-web-backend namespace attaches to a Gateway in another namespace",
            cross_namespace,
        ),
        case(
            "HTTPRouteInvalidCrossNamespaceParentRef",
            "An HTTPRoute is not accepted by a Gateway that only allows routes from its own namespace",
            invalid_cross_namespace_parent_ref,
        ),
        case(
            "HTTPRouteInvalidCrossNamespaceBackendRef",
            "An HTTPRoute referencing a Service in another namespace without a ReferenceGrant reports RefNotPermitted",
            invalid_cross_namespace_backend_ref,
        ),
        case(
            "HTTPRouteInvalidBackendRefUnknownKind",
            "An HTTPRoute referencing a backend of an unknown kind reports InvalidKind",
            invalid_backend_ref_unknown_kind,
        ),
        case(
            "HTTPRouteInvalidNonExistentBackendRef",
            "An HTTPRoute referencing a Service that does not exist reports BackendNotFound",
            invalid_non_existent_backend_ref,
        ),
        case(
            "HTTPRouteMatching",
            "An HTTPRoute with path prefix matches across several rules is accepted",
            path_prefix_matching,
        ),
        case(
            "HTTPExactPathMatching",
            "An HTTPRoute with exact path matches is accepted",
            exact_path_matching,
        ),
        case(
            "HTTPRouteHeaderMatching",
            "An HTTPRoute with exact header matches is accepted",
            header_matching,
        ),
        case(
            "HTTPRouteMethodMatching",
            "An HTTPRoute with HTTP method matches is accepted",
            method_matching,
        )
        .with_features(requires(&[well_known::HTTP_ROUTE_METHOD_MATCHING])),
        case(
            "HTTPRouteQueryParamMatching",
            "An HTTPRoute with query parameter matches is accepted",
            query_param_matching,
        )
        .with_features(requires(&[well_known::HTTP_ROUTE_QUERY_PARAM_MATCHING])),
        case(
            "HTTPRouteReferenceGrant",
            "An HTTPRoute may reference a Service in another namespace once a ReferenceGrant allows it",
            reference_grant,
        )
        .with_features(requires(&[well_known::REFERENCE_GRANT])),
        case(
            "HTTPRouteListenerHostnameMatching",
            "HTTPRoutes attach to the listeners whose hostnames they target",
            listener_hostname_matching,
        ),
        case(
            "HTTPRouteDisallowedKind",
            "An HTTPRoute is not accepted by a listener that only allows other route kinds",
            disallowed_kind,
        ),
        case(
            "HTTPRouteHostnameIntersection",
            "HTTPRoutes are accepted only when their hostnames intersect a listener hostname",
            hostname_intersection,
        ),
        case(
            "TLSRouteSimpleSameNamespace",
            "A single TLSRoute attaches to a passthrough listener in the same namespace",
            tls_route_simple_same_namespace,
        )
        .with_features(requires(&[well_known::TLS_ROUTE])),
    ])
}

// =============================================================================
// Builders
// =============================================================================

fn http_route_ref(namespace: &str, name: &str) -> ResourceRef {
    ResourceRef::namespaced(HttpRoute::API_VERSION, HttpRoute::KIND, namespace, name)
}

fn gateway_ref(name: &str) -> ResourceRef {
    ResourceRef::namespaced(Gateway::API_VERSION, Gateway::KIND, INFRA_NAMESPACE, name)
}

fn http_route(
    namespace: &str,
    name: &str,
    parent_refs: Vec<ParentRef>,
    hostnames: &[&str],
    rules: Vec<HttpRouteRule>,
) -> HttpRoute {
    HttpRoute::new(
        ObjectMeta::new(name, namespace),
        HttpRouteSpec {
            parent_refs,
            hostnames: hostnames.iter().map(|h| h.to_string()).collect(),
            rules,
        },
    )
}

fn infra_backend() -> BackendRef {
    BackendRef::service(INFRA_BACKEND, BACKEND_PORT)
}

/// Route in the infra namespace attached to the same-namespace Gateway
fn same_namespace_route(name: &str, rules: Vec<HttpRouteRule>) -> HttpRoute {
    http_route(
        INFRA_NAMESPACE,
        name,
        vec![ParentRef::gateway(SAME_NAMESPACE_GATEWAY, INFRA_NAMESPACE)],
        &[],
        rules,
    )
}

/// Route that must be accepted with all references resolved
fn accepted_route_scenario(route: HttpRoute, parent: &str) -> Result<Scenario> {
    let r = http_route_ref(
        route.metadata.namespace.as_deref().unwrap_or(INFRA_NAMESPACE),
        &route.metadata.name,
    );
    Ok(Scenario {
        resources: vec![to_manifest(&route)?],
        expectations: vec![
            Expectation::route_parent(&r, parent, ACCEPTED, STATUS_TRUE),
            Expectation::route_parent(&r, parent, RESOLVED_REFS, STATUS_TRUE),
        ],
    })
}

/// Route that is accepted but whose backend cannot be resolved
fn unresolved_backend_scenario(name: &str, backend: BackendRef, reason: &'static str) -> Result<Scenario> {
    let route = same_namespace_route(name, vec![HttpRouteRule::to_backend(backend)]);
    let r = http_route_ref(INFRA_NAMESPACE, name);
    Ok(Scenario {
        resources: vec![to_manifest(&route)?],
        expectations: vec![
            Expectation::route_parent(&r, SAME_NAMESPACE_GATEWAY, ACCEPTED, STATUS_TRUE),
            Expectation::route_parent(&r, SAME_NAMESPACE_GATEWAY, RESOLVED_REFS, STATUS_FALSE)
                .with_reason(reason),
        ],
    })
}

/// Gateway owned by a single check
fn owned_gateway(name: &str, gateway_class_name: &str, listeners: Vec<GatewayListener>) -> Gateway {
    Gateway::new(
        ObjectMeta::new(name, INFRA_NAMESPACE),
        GatewaySpec {
            gateway_class_name: gateway_class_name.to_string(),
            listeners,
        },
    )
}

// =============================================================================
// Scenarios
// =============================================================================

fn simple_same_namespace(_: &str) -> Result<Scenario> {
    accepted_route_scenario(
        same_namespace_route(
            "gateway-conformance-infra-test",
            vec![HttpRouteRule::to_backend(infra_backend())],
        ),
        SAME_NAMESPACE_GATEWAY,
    )
}

fn cross_namespace(_: &str) -> Result<Scenario> {
    let route = http_route(
        WEB_BACKEND_NAMESPACE,
        "cross-namespace",
        vec![ParentRef::gateway(ALL_NAMESPACES_GATEWAY, INFRA_NAMESPACE)],
        &[],
        vec![HttpRouteRule::to_backend(BackendRef::service(WEB_BACKEND, BACKEND_PORT))],
    );
    accepted_route_scenario(route, ALL_NAMESPACES_GATEWAY)
}

fn invalid_cross_namespace_parent_ref(_: &str) -> Result<Scenario> {
    let name = "invalid-cross-namespace-parent-ref";
    let route = http_route(
        WEB_BACKEND_NAMESPACE,
        name,
        vec![ParentRef::gateway(SAME_NAMESPACE_GATEWAY, INFRA_NAMESPACE)],
        &[],
        vec![HttpRouteRule::to_backend(BackendRef::service(WEB_BACKEND, BACKEND_PORT))],
    );
    let r = http_route_ref(WEB_BACKEND_NAMESPACE, name);
    Ok(Scenario {
        resources: vec![to_manifest(&route)?],
        expectations: vec![Expectation::route_parent(
            &r,
            SAME_NAMESPACE_GATEWAY,
            ACCEPTED,
            STATUS_FALSE,
        )
        .with_reason("NotAllowedByListeners")],
    })
}

fn invalid_cross_namespace_backend_ref(_: &str) -> Result<Scenario> {
    let name = "invalid-cross-namespace-backend-ref";
    let backend = BackendRef::service(WEB_BACKEND, BACKEND_PORT).in_namespace(WEB_BACKEND_NAMESPACE);
    let mut scenario = unresolved_backend_scenario(name, backend, "RefNotPermitted")?;
    // Only implementations enforcing ReferenceGrant must reject the reference
    if let Some(last) = scenario.expectations.pop() {
        scenario
            .expectations
            .push(last.gated_by(well_known::REFERENCE_GRANT));
    }
    Ok(scenario)
}

fn invalid_backend_ref_unknown_kind(_: &str) -> Result<Scenario> {
    let backend = BackendRef::service(INFRA_BACKEND, BACKEND_PORT)
        .with_group_kind("unknown.example.com", "NonExistent");
    unresolved_backend_scenario("invalid-backend-ref-unknown-kind", backend, "InvalidKind")
}

fn invalid_non_existent_backend_ref(_: &str) -> Result<Scenario> {
    let backend = BackendRef::service("nonexistent", BACKEND_PORT);
    unresolved_backend_scenario("invalid-nonexistent-backend-ref", backend, "BackendNotFound")
}

fn path_prefix_matching(_: &str) -> Result<Scenario> {
    accepted_route_scenario(
        same_namespace_route(
            "matching",
            vec![
                HttpRouteRule::to_backend(infra_backend())
                    .with_match(HttpRouteMatch::path_prefix("/")),
                HttpRouteRule::to_backend(infra_backend())
                    .with_match(HttpRouteMatch::path_prefix("/v2")),
            ],
        ),
        SAME_NAMESPACE_GATEWAY,
    )
}

fn exact_path_matching(_: &str) -> Result<Scenario> {
    accepted_route_scenario(
        same_namespace_route(
            "exact-path-matching",
            vec![
                HttpRouteRule::to_backend(infra_backend())
                    .with_match(HttpRouteMatch::exact_path("/one")),
                HttpRouteRule::to_backend(infra_backend())
                    .with_match(HttpRouteMatch::exact_path("/two")),
            ],
        ),
        SAME_NAMESPACE_GATEWAY,
    )
}

fn header_matching(_: &str) -> Result<Scenario> {
    accepted_route_scenario(
        same_namespace_route(
            "header-matching",
            vec![
                HttpRouteRule::to_backend(infra_backend())
                    .with_match(HttpRouteMatch::header("version", "one")),
                HttpRouteRule::to_backend(infra_backend())
                    .with_match(HttpRouteMatch::header("version", "two")),
            ],
        ),
        SAME_NAMESPACE_GATEWAY,
    )
}

fn method_matching(_: &str) -> Result<Scenario> {
    accepted_route_scenario(
        same_namespace_route(
            "method-matching",
            vec![
                HttpRouteRule::to_backend(infra_backend()).with_match(HttpRouteMatch::method("POST")),
                HttpRouteRule::to_backend(infra_backend()).with_match(HttpRouteMatch::method("GET")),
            ],
        ),
        SAME_NAMESPACE_GATEWAY,
    )
}

fn query_param_matching(_: &str) -> Result<Scenario> {
    accepted_route_scenario(
        same_namespace_route(
            "query-param-matching",
            vec![
                HttpRouteRule::to_backend(infra_backend())
                    .with_match(HttpRouteMatch::query_param("animal", "whale")),
                HttpRouteRule::to_backend(infra_backend())
                    .with_match(HttpRouteMatch::query_param("animal", "dolphin")),
            ],
        ),
        SAME_NAMESPACE_GATEWAY,
    )
}

fn reference_grant(_: &str) -> Result<Scenario> {
    let name = "reference-grant";
    let route = same_namespace_route(
        name,
        vec![HttpRouteRule::to_backend(
            BackendRef::service(WEB_BACKEND, BACKEND_PORT).in_namespace(WEB_BACKEND_NAMESPACE),
        )],
    );
    let grant = ReferenceGrant::http_routes_to_services(
        ObjectMeta::new("reference-grant", WEB_BACKEND_NAMESPACE),
        INFRA_NAMESPACE,
    );
    let mut scenario = accepted_route_scenario(route, SAME_NAMESPACE_GATEWAY)?;
    scenario.resources.insert(0, to_manifest(&grant)?);
    Ok(scenario)
}

fn listener_hostname_matching(gateway_class_name: &str) -> Result<Scenario> {
    let gw_name = "httproute-listener-hostname-matching";
    let gateway = owned_gateway(
        gw_name,
        gateway_class_name,
        vec![
            GatewayListener::http("listener-1", 80)
                .with_hostname("bar.com")
                .with_allowed_routes(AllowedRoutes::same_namespace()),
            GatewayListener::http("listener-2", 80)
                .with_hostname("foo.bar.com")
                .with_allowed_routes(AllowedRoutes::same_namespace()),
        ],
    );
    let parent = |section: &str| {
        ParentRef::gateway(gw_name, INFRA_NAMESPACE).with_section(section.to_string())
    };
    let backend_route = |name: &str, section: &str| {
        http_route(
            INFRA_NAMESPACE,
            name,
            vec![parent(section)],
            &[],
            vec![HttpRouteRule::to_backend(infra_backend())],
        )
    };
    let routes = [
        backend_route("backend-v1", "listener-1"),
        backend_route("backend-v2", "listener-2"),
    ];

    let mut scenario = Scenario {
        resources: vec![to_manifest(&gateway)?],
        expectations: vec![Expectation::resource(&gateway_ref(gw_name), ACCEPTED, STATUS_TRUE)],
    };
    for route in &routes {
        scenario.resources.push(to_manifest(route)?);
        scenario.expectations.push(Expectation::route_parent(
            &http_route_ref(INFRA_NAMESPACE, &route.metadata.name),
            gw_name,
            ACCEPTED,
            STATUS_TRUE,
        ));
    }
    Ok(scenario)
}

fn disallowed_kind(gateway_class_name: &str) -> Result<Scenario> {
    let gw_name = "tcp-only";
    let gateway = owned_gateway(
        gw_name,
        gateway_class_name,
        vec![GatewayListener::http("tcp", 8080)
            .with_allowed_routes(AllowedRoutes::same_namespace().with_kind("TCPRoute"))],
    );
    let name = "disallowed-kind";
    let route = http_route(
        INFRA_NAMESPACE,
        name,
        vec![ParentRef::gateway(gw_name, INFRA_NAMESPACE)],
        &[],
        vec![HttpRouteRule::to_backend(infra_backend())],
    );
    Ok(Scenario {
        resources: vec![to_manifest(&gateway)?, to_manifest(&route)?],
        expectations: vec![Expectation::route_parent(
            &http_route_ref(INFRA_NAMESPACE, name),
            gw_name,
            ACCEPTED,
            STATUS_FALSE,
        )
        .with_reason("NotAllowedByListeners")],
    })
}

fn hostname_intersection(gateway_class_name: &str) -> Result<Scenario> {
    let gw_name = "httproute-hostname-intersection";
    let gateway = owned_gateway(
        gw_name,
        gateway_class_name,
        vec![GatewayListener::http("wildcard", 80)
            .with_hostname("*.wildcard.io")
            .with_allowed_routes(AllowedRoutes::same_namespace())],
    );
    let route = |name: &str, hostname: &str| {
        http_route(
            INFRA_NAMESPACE,
            name,
            vec![ParentRef::gateway(gw_name, INFRA_NAMESPACE)],
            &[hostname],
            vec![HttpRouteRule::to_backend(infra_backend())],
        )
    };
    let matching = route("specific-host-matches-listener-wildcard-host", "foo.wildcard.io");
    let disjoint = route("no-intersecting-hosts", "non.matching.com");

    Ok(Scenario {
        resources: vec![
            to_manifest(&gateway)?,
            to_manifest(&matching)?,
            to_manifest(&disjoint)?,
        ],
        expectations: vec![
            Expectation::route_parent(
                &http_route_ref(INFRA_NAMESPACE, &matching.metadata.name),
                gw_name,
                ACCEPTED,
                STATUS_TRUE,
            ),
            Expectation::route_parent(
                &http_route_ref(INFRA_NAMESPACE, &disjoint.metadata.name),
                gw_name,
                ACCEPTED,
                STATUS_FALSE,
            )
            .with_reason("NoMatchingListenerHostname"),
        ],
    })
}

fn tls_route_simple_same_namespace(gateway_class_name: &str) -> Result<Scenario> {
    let gw_name = "gateway-tlsroute";
    let gateway = owned_gateway(
        gw_name,
        gateway_class_name,
        vec![GatewayListener::tls_passthrough("tls", 443)
            .with_allowed_routes(AllowedRoutes::same_namespace().with_kind(TlsRoute::KIND))],
    );
    let name = "gateway-conformance-infra-test";
    let route = TlsRoute::new(
        ObjectMeta::new(name, INFRA_NAMESPACE),
        TlsRouteSpec {
            parent_refs: vec![ParentRef::gateway(gw_name, INFRA_NAMESPACE)],
            hostnames: vec!["abc.example.com".to_string()],
            rules: vec![TlsRouteRule {
                backend_refs: vec![BackendRef::service(INFRA_BACKEND, 443)],
            }],
        },
    );
    let r = ResourceRef::namespaced(TlsRoute::API_VERSION, TlsRoute::KIND, INFRA_NAMESPACE, name);
    Ok(Scenario {
        resources: vec![to_manifest(&gateway)?, to_manifest(&route)?],
        expectations: vec![Expectation::route_parent(&r, gw_name, ACCEPTED, STATUS_TRUE)],
    })
}
