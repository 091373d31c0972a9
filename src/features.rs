//! Feature tokens and the capability declaration of an implementation
//!
//! An implementation under test declares two disjoint sets of features:
//!
//! - **Supported**: features it claims to implement. Tests requiring any
//!   other feature are skipped.
//! - **Exempt**: features it declines to assert. Tests requiring them still
//!   run, but assertions gated on them are bypassed.
//!
//! Feature lists enter the system as comma-separated strings and are parsed
//! exactly once, by [`parse_token_set`].

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Well-known Gateway API feature names used by the built-in catalog
pub mod well_known {
    /// ReferenceGrant cross-namespace references
    pub const REFERENCE_GRANT: &str = "ReferenceGrant";
    /// TLSRoute support
    pub const TLS_ROUTE: &str = "TLSRoute";
    /// HTTPRoute query parameter matching
    pub const HTTP_ROUTE_QUERY_PARAM_MATCHING: &str = "HTTPRouteQueryParamMatching";
    /// HTTPRoute method matching
    pub const HTTP_ROUTE_METHOD_MATCHING: &str = "HTTPRouteMethodMatching";
    /// HTTPRoute response header modification
    pub const HTTP_RESPONSE_HEADER_MODIFICATION: &str = "HTTPResponseHeaderModification";
}

/// An opaque, non-empty capability token
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Feature(String);

impl Feature {
    /// Create a feature token, rejecting empty names
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::validation("feature", "feature name must not be empty"));
        }
        Ok(Self(name))
    }

    /// Create a feature from a compile-time constant name
    pub(crate) fn from_static(name: &'static str) -> Self {
        debug_assert!(!name.is_empty());
        Self(name.to_string())
    }

    /// The feature name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Feature {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An unordered, de-duplicated set of features
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet(BTreeSet<Feature>);

impl FeatureSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from compile-time constant names
    pub(crate) fn from_static(names: &[&'static str]) -> Self {
        names.iter().copied().map(Feature::from_static).collect()
    }

    /// Check membership by name
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Insert a feature, returning false if it was already present
    pub fn insert(&mut self, feature: Feature) -> bool {
        self.0.insert(feature)
    }

    /// Iterate features in name order
    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.0.iter()
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the set has no features
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Features present in both sets
    pub fn intersection(&self, other: &FeatureSet) -> FeatureSet {
        self.0.intersection(&other.0).cloned().collect()
    }

    /// Feature names as owned strings, in name order
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|f| f.0.clone()).collect()
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Feature::as_str).collect();
        f.write_str(&names.join(","))
    }
}

/// Split a comma-separated flag value into its tokens.
///
/// Tokens are taken verbatim (no whitespace trimming). An entirely empty
/// input yields no tokens. An empty token inside a non-empty input
/// (`"a,,b"`, `"a,"`, `",a"`) is rejected.
///
/// `field` names the flag being parsed and is used in error messages.
pub fn split_tokens<'a>(field: &str, raw: &'a str) -> Result<Vec<&'a str>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .enumerate()
        .map(|(position, token)| {
            if token.is_empty() {
                Err(Error::validation(
                    field,
                    format!("empty token at position {} in '{}'", position, raw),
                ))
            } else {
                Ok(token)
            }
        })
        .collect()
}

/// Parse a comma-separated feature list into a set of features.
///
/// Follows the [`split_tokens`] empty-token policy; duplicates collapse.
pub fn parse_token_set(field: &str, raw: &str) -> Result<FeatureSet> {
    Ok(split_tokens(field, raw)?
        .into_iter()
        .map(|token| Feature(token.to_string()))
        .collect())
}

/// Supported and exempt feature sets declared for one run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilityDeclaration {
    supported: FeatureSet,
    exempt: FeatureSet,
}

impl CapabilityDeclaration {
    /// Create a declaration, rejecting overlapping sets
    pub fn new(supported: FeatureSet, exempt: FeatureSet) -> Result<Self> {
        let overlap = supported.intersection(&exempt);
        if !overlap.is_empty() {
            return Err(Error::validation(
                "exempt-features",
                format!(
                    "features cannot be both supported and exempt: {}",
                    overlap
                ),
            ));
        }
        Ok(Self { supported, exempt })
    }

    /// Parse both flag values and validate the result
    pub fn from_flags(supported: &str, exempt: &str) -> Result<Self> {
        let supported = parse_token_set("supported-features", supported)?;
        let exempt = parse_token_set("exempt-features", exempt)?;
        Self::new(supported, exempt)
    }

    /// Features the implementation claims to support
    pub fn supported(&self) -> &FeatureSet {
        &self.supported
    }

    /// Features the implementation declines to assert
    pub fn exempt(&self) -> &FeatureSet {
        &self.exempt
    }

    /// Required features that are neither supported nor exempt.
    ///
    /// A non-empty result means the test must be skipped.
    pub fn missing_features(&self, required: &FeatureSet) -> FeatureSet {
        required
            .iter()
            .filter(|f| !self.supported.contains(f.as_str()) && !self.exempt.contains(f.as_str()))
            .cloned()
            .collect()
    }

    /// Required features whose assertions are waived for this run
    pub fn waived_features(&self, required: &FeatureSet) -> FeatureSet {
        required.intersection(&self.exempt)
    }

    /// Whether assertions gated on `feature` must be checked
    pub fn asserts(&self, feature: &str) -> bool {
        self.supported.contains(feature) && !self.exempt.contains(feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&'static str]) -> FeatureSet {
        FeatureSet::from_static(names)
    }

    // ==========================================================================
    // Story: Parsing feature flags
    // ==========================================================================

    #[test]
    fn empty_flag_means_no_features() {
        let parsed = parse_token_set("supported-features", "").unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn duplicate_tokens_collapse_and_order_is_irrelevant() {
        let a = parse_token_set("supported-features", "TLSRoute,ReferenceGrant,TLSRoute").unwrap();
        let b = parse_token_set("supported-features", "ReferenceGrant,TLSRoute").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn empty_tokens_inside_a_value_are_rejected() {
        for raw in ["a,,b", "a,", ",a", ","] {
            let err = parse_token_set("exempt-features", raw).unwrap_err();
            assert!(err.is_configuration(), "{raw} should be rejected");
            assert!(err.to_string().contains("exempt-features"));
        }
    }

    #[test]
    fn tokens_are_taken_verbatim() {
        let parsed = parse_token_set("supported-features", "TLSRoute, ReferenceGrant").unwrap();
        assert!(parsed.contains("TLSRoute"));
        assert!(parsed.contains(" ReferenceGrant"));
        assert!(!parsed.contains("ReferenceGrant"));
    }

    #[test]
    fn split_tokens_keeps_order_and_duplicates() {
        assert_eq!(
            split_tokens("skip-tests", "B,A,B").unwrap(),
            vec!["B", "A", "B"]
        );
        assert!(split_tokens("skip-tests", "").unwrap().is_empty());
        let err = split_tokens("skip-tests", "A,").unwrap_err();
        assert!(err.to_string().contains("position 1"));
    }

    #[test]
    fn membership_is_an_exact_name_lookup() {
        let mut features = FeatureSet::new();
        features.insert(Feature::new("HTTPRouteMethodMatching").unwrap());
        features.insert(Feature::new("TLSRoute").unwrap());
        assert!(features.contains("TLSRoute"));
        assert!(features.contains("HTTPRouteMethodMatching"));
        assert!(!features.contains("HTTPRoute"));
        assert!(!features.contains("tlsroute"));
    }

    #[test]
    fn feature_new_rejects_empty_names() {
        assert!(Feature::new("").is_err());
        assert_eq!(Feature::new("TLSRoute").unwrap().as_str(), "TLSRoute");
    }

    // ==========================================================================
    // Story: Validating the capability declaration
    // ==========================================================================

    #[test]
    fn overlapping_supported_and_exempt_sets_are_rejected() {
        let err = CapabilityDeclaration::from_flags("TLSRoute,ReferenceGrant", "ReferenceGrant")
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("ReferenceGrant"));
    }

    #[test]
    fn disjoint_sets_are_accepted() {
        let caps = CapabilityDeclaration::from_flags("TLSRoute", "ReferenceGrant").unwrap();
        assert!(caps.supported().contains("TLSRoute"));
        assert!(caps.exempt().contains("ReferenceGrant"));
    }

    // ==========================================================================
    // Story: Deciding what runs
    // ==========================================================================

    #[test]
    fn unsupported_required_feature_is_missing() {
        let caps = CapabilityDeclaration::default();
        let missing = caps.missing_features(&set(&["x"]));
        assert_eq!(missing.names(), vec!["x".to_string()]);
    }

    #[test]
    fn exempt_required_feature_is_waived_not_missing() {
        let caps = CapabilityDeclaration::new(FeatureSet::new(), set(&["x"])).unwrap();
        let required = set(&["x"]);
        assert!(caps.missing_features(&required).is_empty());
        assert_eq!(caps.waived_features(&required).names(), vec!["x".to_string()]);
        assert!(!caps.asserts("x"));
    }

    #[test]
    fn supported_feature_is_asserted() {
        let caps = CapabilityDeclaration::new(set(&["y"]), FeatureSet::new()).unwrap();
        assert!(caps.missing_features(&set(&["y"])).is_empty());
        assert!(caps.asserts("y"));
        assert!(!caps.asserts("z"));
    }

    #[test]
    fn display_joins_names_with_commas() {
        assert_eq!(set(&["b", "a"]).to_string(), "a,b");
    }
}
