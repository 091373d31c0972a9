//! Error types for the conformance orchestrator
//!
//! Errors are structured with fields so a failed run can say which stage
//! broke (configuration, bootstrap, setup, cleanup) and on which resource.
//! Per-test failures are not represented here; they live in
//! [`CheckFailure`](crate::registry::CheckFailure) and never abort a run.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for conformance orchestration
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// No usable cluster configuration could be discovered
    #[error("cluster configuration error: {message}")]
    ClusterConfig {
        /// Description of what failed
        message: String,
    },

    /// The Kubernetes client could not be built from a valid configuration
    #[error("client construction error: {message}")]
    ClientConstruction {
        /// Description of what failed
        message: String,
    },

    /// Run configuration failed validation
    #[error("validation error for {field}: {message}")]
    Validation {
        /// The offending configuration field (e.g., "exempt-features")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// A resource kind was used before its schema was registered with the client
    #[error("no schema registered for {kind} in {api_version}")]
    UnregisteredKind {
        /// Full API version (e.g., "gateway.networking.k8s.io/v1beta1")
        api_version: String,
        /// Resource kind (e.g., "HTTPRoute")
        kind: String,
    },

    /// Shared base resources could not be prepared
    #[error("setup error for {resource}: {message}")]
    Setup {
        /// The base resource being prepared
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Shared base resources could not be removed after a run
    #[error("cleanup error for {resource}: {message}")]
    Cleanup {
        /// The base resource being deleted
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "suite", "report")
        context: String,
    },
}

impl Error {
    /// Create a cluster configuration error
    pub fn cluster_config(msg: impl Into<String>) -> Self {
        Self::ClusterConfig {
            message: msg.into(),
        }
    }

    /// Create a client construction error
    pub fn client_construction(msg: impl Into<String>) -> Self {
        Self::ClientConstruction {
            message: msg.into(),
        }
    }

    /// Create a validation error for a configuration field
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create an unregistered-kind error
    pub fn unregistered_kind(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::UnregisteredKind {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }

    /// Create a setup error for a base resource
    pub fn setup_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Setup {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a cleanup error for a base resource
    pub fn cleanup_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Cleanup {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Configuration problems never heal on their own. Kubernetes 4xx responses
    /// are permanent; connection failures and 5xx responses are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::ClusterConfig { .. } => false,
            Error::ClientConstruction { .. } => false,
            Error::Validation { .. } => false,
            Error::UnregisteredKind { .. } => false,
            Error::Setup { .. } => true,
            Error::Cleanup { .. } => true,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Check if this error belongs to the fatal configuration/bootstrap class
    ///
    /// These abort a run before any base resource is touched.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::ClusterConfig { .. }
                | Error::ClientConstruction { .. }
                | Error::Validation { .. }
                | Error::UnregisteredKind { .. }
        )
    }

    /// Get the resource name if this error is tied to a base resource
    pub fn resource(&self) -> Option<&str> {
        match self {
            Error::Setup { resource, .. } | Error::Cleanup { resource, .. } => Some(resource),
            _ => None,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            Error::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Errors Across the Run Lifecycle
    // ==========================================================================
    //
    // A conformance run fails in distinct stages. Configuration and bootstrap
    // errors abort before the cluster is touched, setup errors abort before any
    // test runs, and cleanup errors only produce warnings.

    /// Story: Misconfigured feature flags are reported with the offending flag
    #[test]
    fn story_validation_names_the_offending_field() {
        let err = Error::validation("exempt-features", "feature 'TLSRoute' is also supported");
        assert!(err.to_string().contains("exempt-features"));
        assert!(err.to_string().contains("TLSRoute"));
        assert_eq!(err.context(), Some("exempt-features"));
        assert!(err.is_configuration());
        assert!(!err.is_retryable());
    }

    /// Story: A missing kubeconfig stops the run before anything else happens
    #[test]
    fn story_bootstrap_errors_are_fatal_configuration() {
        let err = Error::cluster_config("unable to infer cluster configuration");
        assert!(err.is_configuration());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("cluster configuration error"));

        let err = Error::client_construction("invalid TLS settings");
        assert!(err.is_configuration());
        assert!(err.to_string().contains("client construction error"));
    }

    /// Story: Using a Gateway API kind before its schema is registered is an error
    #[test]
    fn story_unregistered_kind_reports_group_version() {
        let err = Error::unregistered_kind("gateway.networking.k8s.io/v1beta1", "HTTPRoute");
        assert!(err.to_string().contains("HTTPRoute"));
        assert!(err.to_string().contains("gateway.networking.k8s.io/v1beta1"));
        assert!(err.is_configuration());
    }

    /// Story: Setup and cleanup errors carry the base resource involved
    #[test]
    fn story_setup_and_cleanup_errors_name_the_resource() {
        let err = Error::setup_for("Gateway gateway-conformance-infra/same-namespace", "timeout");
        assert_eq!(
            err.resource(),
            Some("Gateway gateway-conformance-infra/same-namespace")
        );
        assert!(!err.is_configuration());
        assert!(err.is_retryable());

        let err = Error::cleanup_for("Namespace gateway-conformance-infra", "forbidden");
        assert!(err.to_string().contains("cleanup error"));
        assert_eq!(err.resource(), Some("Namespace gateway-conformance-infra"));
    }

    #[test]
    fn test_serialization_for_kind() {
        let err = Error::serialization_for_kind("Gateway", "missing field 'spec'");
        match &err {
            Error::Serialization { kind, .. } => assert_eq!(kind.as_deref(), Some("Gateway")),
            _ => panic!("Expected Serialization variant"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_internal_error_default_context() {
        let err = Error::internal("unexpected state");
        assert_eq!(err.context(), Some(UNKNOWN_CONTEXT));
        assert!(err.to_string().contains("[unknown]"));
    }

    #[test]
    fn test_internal_error_with_context() {
        let err = Error::internal_with_context("suite", "run called before setup");
        assert_eq!(err.context(), Some("suite"));
        assert!(err.to_string().contains("[suite]"));
        assert!(err.is_retryable());
    }
}
