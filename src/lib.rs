//! Gateway API conformance orchestrator
//!
//! Declares which optional features an implementation supports, selects the
//! registered conformance tests that apply, prepares shared base resources on
//! a live cluster, and runs each test to a pass, fail, or skip outcome.

#![deny(missing_docs)]

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod exclusion;
pub mod features;
pub mod gateway_api;
pub mod kube_utils;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod suite;
pub mod telemetry;
pub mod timeouts;

pub use error::Error;

/// Result type for conformance operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "gateway-conformance";

/// Label marking resources created by a conformance run
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] on resources created by a conformance run
pub const LABEL_MANAGED_BY_CONFORMANCE: &str = "gateway-conformance";
