//! Exclusion policy: tests an implementation never runs
//!
//! Each entry names a registered test and records why it is skipped
//! (for example a data-plane gap or an unreliable environment).
//! Policies load from a YAML file of the form:
//!
//! ```yaml
//! exclusions:
//!   - name: HTTPRouteHeaderMatching
//!     reason: expects a 404 response the data plane cannot produce yet
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::features::split_tokens;
use crate::registry::TestRegistry;
use crate::{Error, Result};

/// Exclusion policy applied when no policy file is given
pub const DEFAULT_EXCLUSIONS_YAML: &str = include_str!("../conformance/exclusions.yaml");

/// One excluded test and its justification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionEntry {
    /// Short name of the excluded test
    pub name: String,
    /// Why the test is excluded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExclusionFile {
    #[serde(default)]
    exclusions: Vec<ExclusionEntry>,
}

/// Ordered, de-duplicated list of excluded test short names
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExclusionList {
    entries: Vec<ExclusionEntry>,
}

impl ExclusionList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from bare names with no recorded reason
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::new();
        for name in names {
            list.push(ExclusionEntry {
                name: name.into(),
                reason: None,
            });
        }
        list
    }

    /// Parse a comma-separated `--skip-tests` value.
    ///
    /// Same empty-token policy as feature flags: an empty value is an empty
    /// list, an empty token inside a value is rejected.
    pub fn from_flag(raw: &str) -> Result<Self> {
        Ok(Self::from_names(split_tokens("skip-tests", raw)?))
    }

    /// Parse a YAML exclusion policy
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: ExclusionFile = serde_yaml::from_str(yaml)
            .map_err(|e| Error::validation("exclusions-file", format!("invalid YAML: {}", e)))?;
        let mut list = Self::new();
        for entry in file.exclusions {
            if entry.name.is_empty() {
                return Err(Error::validation(
                    "exclusions-file",
                    "exclusion entry has an empty name",
                ));
            }
            list.push(entry);
        }
        Ok(list)
    }

    /// The maintained default policy shipped with the binary
    pub fn shipped() -> Result<Self> {
        Self::from_yaml(DEFAULT_EXCLUSIONS_YAML)
    }

    /// Load a YAML exclusion policy from disk
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::validation(
                "exclusions-file",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        let list = Self::from_yaml(&yaml)?;
        debug!(path = %path.display(), entries = list.len(), "loaded exclusion policy");
        Ok(list)
    }

    /// Append an entry; a repeated name keeps its first position and reason
    pub fn push(&mut self, entry: ExclusionEntry) {
        if !self.contains(&entry.name) {
            self.entries.push(entry);
        }
    }

    /// Append every entry of `other` in order
    pub fn merge(&mut self, other: ExclusionList) {
        for entry in other.entries {
            self.push(entry);
        }
    }

    /// Whether a test short name is excluded
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[ExclusionEntry] {
        &self.entries
    }

    /// Number of excluded tests
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is excluded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject entries naming tests the registry doesn't know
    pub fn validate_against(&self, registry: &TestRegistry) -> Result<()> {
        let unknown: Vec<&str> = self
            .entries
            .iter()
            .map(|e| e.name.as_str())
            .filter(|name| !registry.contains(name))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(
                "exclusions",
                format!("unknown test names: {}", unknown.join(", ")),
            ))
        }
    }
}
