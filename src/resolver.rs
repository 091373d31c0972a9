//! Test set resolution
//!
//! Resolution only applies structural exclusion. Feature gating happens in
//! the suite at run time because a case may still run with some of its
//! assertions waived.

use crate::exclusion::ExclusionList;
use crate::registry::{TestCase, TestRegistry};
use crate::{Error, Result};

/// Cases in registry order whose short name is not excluded
pub fn resolve<'r>(registry: &'r TestRegistry, exclusions: &ExclusionList) -> Vec<&'r TestCase> {
    registry
        .iter()
        .filter(|case| !exclusions.contains(case.short_name()))
        .collect()
}

/// Narrow a resolved set to one named case
///
/// The name must be registered. A registered but excluded case yields an
/// empty set.
pub fn select_single<'r>(
    registry: &TestRegistry,
    resolved: Vec<&'r TestCase>,
    short_name: &str,
) -> Result<Vec<&'r TestCase>> {
    if !registry.contains(short_name) {
        return Err(Error::validation(
            "run-test",
            format!("unknown test name '{}'", short_name),
        ));
    }
    Ok(resolved
        .into_iter()
        .filter(|case| case.short_name() == short_name)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::passing_case;

    fn registry(names: &[&str]) -> TestRegistry {
        TestRegistry::new(names.iter().map(|n| passing_case(n)).collect()).unwrap()
    }

    fn names<'a>(cases: &[&'a TestCase]) -> Vec<&'a str> {
        cases.iter().map(|c| c.short_name()).collect()
    }

    #[test]
    fn excluded_cases_are_removed() {
        let r = registry(&["A", "B", "C"]);
        let resolved = resolve(&r, &ExclusionList::from_names(["B"]));
        assert_eq!(names(&resolved), vec!["A", "C"]);
    }

    #[test]
    fn output_follows_registry_order_not_exclusion_order() {
        let r = registry(&["E", "D", "C", "B", "A"]);
        let resolved = resolve(&r, &ExclusionList::from_names(["A", "C"]));
        assert_eq!(names(&resolved), vec!["E", "D", "B"]);
    }

    #[test]
    fn empty_exclusions_keep_every_case() {
        let r = registry(&["A", "B"]);
        assert_eq!(names(&resolve(&r, &ExclusionList::new())), vec!["A", "B"]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let r = registry(&["A", "B", "C", "D"]);
        let e = ExclusionList::from_names(["D", "B"]);
        assert_eq!(names(&resolve(&r, &e)), names(&resolve(&r, &e)));
    }

    #[test]
    fn select_single_narrows_to_one_case() {
        let r = registry(&["A", "B", "C"]);
        let selected = select_single(&r, resolve(&r, &ExclusionList::new()), "B").unwrap();
        assert_eq!(names(&selected), vec!["B"]);
    }

    #[test]
    fn select_single_of_excluded_case_is_empty() {
        let r = registry(&["A", "B"]);
        let resolved = resolve(&r, &ExclusionList::from_names(["B"]));
        assert!(select_single(&r, resolved, "B").unwrap().is_empty());
    }

    #[test]
    fn select_single_rejects_unknown_names() {
        let r = registry(&["A"]);
        let err = select_single(&r, resolve(&r, &ExclusionList::new()), "Z").unwrap_err();
        assert!(err.is_configuration());
    }
}
