//! Command-line configuration
//!
//! Flags are parsed by clap, with `GATEWAY_CONFORMANCE_*` environment
//! fallbacks. [`ConformanceArgs::into_settings`] converts the raw strings
//! into typed values once, and [`RunSettings::validate`] checks them against
//! the test registry before anything touches the cluster.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::exclusion::ExclusionList;
use crate::features::CapabilityDeclaration;
use crate::registry::TestRegistry;
use crate::suite::validate_run;
use crate::timeouts::TimeoutConfig;
use crate::Result;

/// Default consistency budget for a CLI run, in seconds
pub const DEFAULT_MAX_TIME_TO_CONSISTENCY_SECS: u64 = 60;

/// Run the Gateway API conformance suite against a live cluster
#[derive(Parser, Debug, Clone)]
#[command(name = "gateway-conformance", version, about, long_about = None)]
pub struct ConformanceArgs {
    /// Name of the GatewayClass under test
    #[arg(long, env = "GATEWAY_CONFORMANCE_GATEWAY_CLASS", default_value = "gateway-conformance")]
    pub gateway_class: String,

    /// Comma-separated features the implementation supports
    #[arg(long, env = "GATEWAY_CONFORMANCE_SUPPORTED_FEATURES", default_value = "")]
    pub supported_features: String,

    /// Comma-separated features whose assertions are waived
    #[arg(long, env = "GATEWAY_CONFORMANCE_EXEMPT_FEATURES", default_value = "")]
    pub exempt_features: String,

    /// Comma-separated test short names to skip
    #[arg(long, env = "GATEWAY_CONFORMANCE_SKIP_TESTS", default_value = "")]
    pub skip_tests: String,

    /// YAML file listing excluded tests and why; replaces the shipped policy
    #[arg(long, env = "GATEWAY_CONFORMANCE_EXCLUSIONS_FILE")]
    pub exclusions_file: Option<PathBuf>,

    /// Start from an empty exclusion policy instead of the shipped one
    #[arg(long, env = "GATEWAY_CONFORMANCE_NO_DEFAULT_EXCLUSIONS", conflicts_with = "exclusions_file")]
    pub no_default_exclusions: bool,

    /// Run only the named test
    #[arg(long, env = "GATEWAY_CONFORMANCE_RUN_TEST")]
    pub run_test: Option<String>,

    /// Seconds to wait for a mutation to become visible in status
    #[arg(
        long,
        env = "GATEWAY_CONFORMANCE_MAX_TIME_TO_CONSISTENCY_SECS",
        default_value_t = DEFAULT_MAX_TIME_TO_CONSISTENCY_SECS
    )]
    pub max_time_to_consistency_secs: u64,

    /// Delete base resources after the run
    #[arg(long, env = "GATEWAY_CONFORMANCE_CLEANUP_BASE_RESOURCES", default_value_t = true, action = clap::ArgAction::Set)]
    pub cleanup_base_resources: bool,

    /// Verbose diagnostics
    #[arg(long, env = "GATEWAY_CONFORMANCE_DEBUG")]
    pub debug: bool,

    /// Emit JSON logs
    #[arg(long, env = "GATEWAY_CONFORMANCE_JSON_LOGS")]
    pub json_logs: bool,

    /// Path to a kubeconfig; inferred when omitted
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Write the run report as JSON to this path
    #[arg(long, env = "GATEWAY_CONFORMANCE_REPORT")]
    pub report: Option<PathBuf>,
}

/// Typed, validated-at-the-boundary settings for one run
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// GatewayClass under test
    pub gateway_class: String,
    /// Supported and exempt features
    pub capabilities: CapabilityDeclaration,
    /// Policy exclusions followed by flag exclusions
    pub exclusions: ExclusionList,
    /// Run only this test
    pub run_test: Option<String>,
    /// Polling budgets
    pub timeouts: TimeoutConfig,
    /// Delete base resources after the run
    pub cleanup_base_resources: bool,
    /// Verbose diagnostics
    pub debug: bool,
    /// Emit JSON logs
    pub json_logs: bool,
    /// Kubeconfig path
    pub kubeconfig: Option<PathBuf>,
    /// Report output path
    pub report: Option<PathBuf>,
}

impl ConformanceArgs {
    /// Parse token lists and load the exclusion policy
    pub fn into_settings(self) -> Result<RunSettings> {
        let capabilities =
            CapabilityDeclaration::from_flags(&self.supported_features, &self.exempt_features)?;

        let mut exclusions = match &self.exclusions_file {
            Some(path) => ExclusionList::load(path)?,
            None if self.no_default_exclusions => ExclusionList::new(),
            None => ExclusionList::shipped()?,
        };
        exclusions.merge(ExclusionList::from_flag(&self.skip_tests)?);

        let timeouts = TimeoutConfig::default()
            .with_max_time_to_consistency(Duration::from_secs(self.max_time_to_consistency_secs));

        Ok(RunSettings {
            gateway_class: self.gateway_class,
            capabilities,
            exclusions,
            run_test: self.run_test,
            timeouts,
            cleanup_base_resources: self.cleanup_base_resources,
            debug: self.debug,
            json_logs: self.json_logs,
            kubeconfig: self.kubeconfig,
            report: self.report,
        })
    }
}

impl RunSettings {
    /// Check settings against the registry; runs before any cluster contact
    pub fn validate(&self, registry: &TestRegistry) -> Result<()> {
        validate_run(
            &self.gateway_class,
            &self.timeouts,
            &self.exclusions,
            self.run_test.as_deref(),
            registry,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::registry::tests::passing_case;

    fn parse(args: &[&str]) -> ConformanceArgs {
        let mut argv = vec!["gateway-conformance"];
        argv.extend_from_slice(args);
        ConformanceArgs::try_parse_from(argv).unwrap()
    }

    fn registry() -> TestRegistry {
        TestRegistry::new(vec![passing_case("A"), passing_case("B")]).unwrap()
    }

    #[test]
    fn defaults_apply_the_shipped_exclusions() {
        let settings = parse(&[]).into_settings().unwrap();
        assert!(settings.capabilities.supported().is_empty());
        assert_eq!(settings.exclusions.len(), 8);
        assert!(settings.exclusions.contains("HTTPRouteHeaderMatching"));
        let registry = crate::catalog::builtin_registry().unwrap();
        assert!(settings.validate(&registry).is_ok());
        assert!(settings.cleanup_base_resources);
        assert_eq!(
            settings.timeouts.max_time_to_consistency,
            Duration::from_secs(DEFAULT_MAX_TIME_TO_CONSISTENCY_SECS)
        );
    }

    #[test]
    fn flags_are_parsed_into_typed_settings() {
        let settings = parse(&[
            "--gateway-class",
            "envoy",
            "--supported-features",
            "TLSRoute,ReferenceGrant",
            "--exempt-features",
            "HTTPRouteMethodMatching",
            "--skip-tests",
            "B",
            "--no-default-exclusions",
            "--cleanup-base-resources",
            "false",
            "--max-time-to-consistency-secs",
            "90",
        ])
        .into_settings()
        .unwrap();
        assert_eq!(settings.gateway_class, "envoy");
        assert_eq!(settings.capabilities.supported().len(), 2);
        assert!(settings.capabilities.exempt().contains("HTTPRouteMethodMatching"));
        assert!(settings.exclusions.contains("B"));
        assert!(!settings.cleanup_base_resources);
        assert_eq!(
            settings.timeouts.max_time_to_consistency,
            Duration::from_secs(90)
        );
        assert!(settings.validate(&registry()).is_ok());
    }

    #[test]
    fn overlapping_features_fail_before_validation() {
        let err = parse(&["--supported-features", "x", "--exempt-features", "x"])
            .into_settings()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn empty_feature_token_is_rejected() {
        assert!(parse(&["--supported-features", "a,,b"]).into_settings().is_err());
    }

    #[test]
    fn file_and_flag_exclusions_merge_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "exclusions:\n  - name: B\n    reason: flaky\n  - name: A").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let settings = parse(&["--exclusions-file", &path, "--skip-tests", "A"])
            .into_settings()
            .unwrap();
        let names: Vec<_> = settings
            .exclusions
            .entries()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(settings.exclusions.entries()[0].reason.as_deref(), Some("flaky"));
    }

    #[test]
    fn skip_flag_merges_on_top_of_the_shipped_policy() {
        let settings = parse(&["--skip-tests", "HTTPRouteMatching,HTTPRouteHeaderMatching"])
            .into_settings()
            .unwrap();
        assert_eq!(settings.exclusions.len(), 9);
        assert_eq!(settings.exclusions.entries()[8].name, "HTTPRouteMatching");
    }

    #[test]
    fn policy_file_replaces_the_shipped_policy() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "exclusions: []").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let settings = parse(&["--exclusions-file", &path]).into_settings().unwrap();
        assert!(settings.exclusions.is_empty());
    }

    #[test]
    fn disabling_defaults_starts_from_an_empty_policy() {
        let settings = parse(&["--no-default-exclusions"]).into_settings().unwrap();
        assert!(settings.exclusions.is_empty());
        let path = "/tmp/exclusions.yaml";
        assert!(ConformanceArgs::try_parse_from([
            "gateway-conformance",
            "--no-default-exclusions",
            "--exclusions-file",
            path
        ])
        .is_err());
    }

    #[test]
    fn unknown_exclusion_fails_validation() {
        let settings = parse(&["--no-default-exclusions", "--skip-tests", "Nope"])
            .into_settings()
            .unwrap();
        let err = settings.validate(&registry()).unwrap_err();
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn unknown_run_test_fails_validation() {
        let settings = parse(&["--no-default-exclusions", "--run-test", "Z"])
            .into_settings()
            .unwrap();
        assert!(settings.validate(&registry()).is_err());
    }

    #[test]
    fn shipped_exclusions_match_the_builtin_catalog() {
        let exclusions = ExclusionList::shipped().unwrap();
        let registry = crate::catalog::builtin_registry().unwrap();
        assert!(exclusions.validate_against(&registry).is_ok());
        assert_eq!(exclusions.len(), 8);
    }
}
