use regex::Regex;
use std::sync::LazyLock;

use crate::{
    grouping::DEFAULT_NON_MAJOR_GROUP, update::PackageUpdate,
    update::UpdateType, version,
};

pub const TITLE_PREFIX: &str = "chore(deps):";

static SINGLE_DEPENDENCY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bupdate\s+dependency\s+(?<pkg>[^\s]+)").unwrap()
});

static SEVERITY_UPDATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:major|minor|patch)\s+update\s+-\s+(?<pkg>[^\s]+)\s*$")
        .unwrap()
});

/// What a pull-request title says about the dependencies it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleKind {
    /// Names exactly one package
    Single(String),
    /// Covers several packages ("all non-major dependencies", named groups)
    Aggregate,
}

/// Deterministic title for a group, keyed by its name and severity.
pub fn render(
    group_name: &str,
    update_type: UpdateType,
    updates: &[PackageUpdate],
) -> String {
    // one package, possibly declared in several manifests
    if let Some(first) = updates.first()
        && updates.iter().all(|u| u.name == first.name)
    {
        return format!(
            "{TITLE_PREFIX} update dependency {} to {}",
            first.name,
            version::strip_operators(&first.new_version)
        );
    }

    if group_name == DEFAULT_NON_MAJOR_GROUP {
        return format!("{TITLE_PREFIX} update all non-major dependencies");
    }

    match update_type {
        UpdateType::Major => format!(
            "{TITLE_PREFIX} update {} dependencies (major)",
            group_name.to_lowercase()
        ),
        _ => format!(
            "{TITLE_PREFIX} update {} dependencies",
            group_name.to_lowercase()
        ),
    }
}

pub fn kind(title: &str) -> TitleKind {
    let captures = SINGLE_DEPENDENCY_REGEX
        .captures(title)
        .or_else(|| SEVERITY_UPDATE_REGEX.captures(title));

    match captures {
        Some(c) => TitleKind::Single(c["pkg"].to_string()),
        None => TitleKind::Aggregate,
    }
}

/// Title-similarity heuristic used to recognise an existing pull request.
///
/// Identical titles are always similar. Single-dependency titles are similar
/// only when they name the same package. An aggregate title is never similar
/// to a single-dependency title, and differing aggregate titles are not
/// similar either. One pull request per dependency depends on this staying
/// strict.
pub fn are_similar(a: &str, b: &str) -> bool {
    if a.trim() == b.trim() {
        return true;
    }

    match (kind(a), kind(b)) {
        (TitleKind::Single(x), TitleKind::Single(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::package_update;

    #[test]
    fn renders_single_dependency_title() {
        let updates = vec![package_update("lodash", "^4.17.20", "4.17.21")];
        assert_eq!(
            render("Non-Major Updates", UpdateType::Patch, &updates),
            "chore(deps): update dependency lodash to 4.17.21"
        );
    }

    #[test]
    fn renders_aggregate_titles() {
        let updates = vec![
            package_update("a", "1.0.0", "1.0.1"),
            package_update("b", "1.0.0", "1.1.0"),
        ];
        assert_eq!(
            render(DEFAULT_NON_MAJOR_GROUP, UpdateType::Minor, &updates),
            "chore(deps): update all non-major dependencies"
        );
        assert_eq!(
            render("React", UpdateType::Major, &updates),
            "chore(deps): update react dependencies (major)"
        );
        assert_eq!(
            render("React", UpdateType::Minor, &updates),
            "chore(deps): update react dependencies"
        );
    }

    #[test]
    fn identical_titles_are_similar() {
        let t = "chore(deps): update all non-major dependencies";
        assert!(are_similar(t, t));
    }

    #[test]
    fn same_package_different_version_is_similar() {
        assert!(are_similar(
            "chore(deps): update dependency react to 18.2.0",
            "chore(deps): update dependency react to 18.3.1"
        ));
    }

    #[test]
    fn different_packages_are_never_similar() {
        assert!(!are_similar(
            "chore(deps): update dependency react to 18.2.0",
            "chore(deps): update dependency react-dom to 18.2.0"
        ));
        assert!(!are_similar("Major Update - pkg-a", "Major Update - pkg-b"));
    }

    #[test]
    fn aggregate_never_similar_to_single() {
        assert!(!are_similar(
            "chore(deps): update all non-major dependencies",
            "chore(deps): update dependency lodash to 4.17.21"
        ));
    }

    #[test]
    fn differing_aggregates_are_not_similar() {
        assert!(!are_similar(
            "chore(deps): update all non-major dependencies",
            "chore(deps): update react dependencies (major)"
        ));
    }

    #[test]
    fn detects_title_kind() {
        assert_eq!(
            kind("Major Update - pkg-a"),
            TitleKind::Single("pkg-a".into())
        );
        assert_eq!(
            kind("chore(deps): update dependency @types/node to 20.0.0"),
            TitleKind::Single("@types/node".into())
        );
        assert_eq!(
            kind("chore(deps): update all non-major dependencies"),
            TitleKind::Aggregate
        );
    }
}
