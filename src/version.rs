//! Positional version comparison and classification.
//!
//! Versions are compared segment by segment as plain integers after any
//! leading range operator has been stripped. Pre-release and build metadata
//! (`-beta.1`, `+build.5`) are ignored for ordering, so `1.0.0-beta` and
//! `1.0.0` compare equal. This mirrors how manifest ranges are written in
//! practice and is a known limitation rather than full semver precedence.
use regex::Regex;
use std::{cmp::Ordering, sync::LazyLock};

use crate::update::UpdateType;

static OPERATOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?<op>\^|~>|~|>=|<=|==|>|<|=)?\s*v?").unwrap()
});

const DYNAMIC_MARKERS: &[&str] = &["latest", "*", "x", "next", "canary"];

/// Returns the leading range operator of `version`, if any.
pub fn range_operator(version: &str) -> Option<&str> {
    OPERATOR_REGEX
        .captures(version)
        .and_then(|c| c.name("op"))
        .map(|m| m.as_str())
}

/// Removes leading range operators and a leading `v` from `version`.
pub fn strip_operators(version: &str) -> &str {
    match OPERATOR_REGEX.find(version) {
        Some(m) => version[m.end()..].trim(),
        None => version.trim(),
    }
}

/// Parses the numeric segments of a version. Parsing stops at the first
/// pre-release or build suffix; non-numeric segments count as zero.
fn segments(version: &str) -> Vec<u64> {
    let core = strip_operators(version)
        .split(['-', '+', ' '])
        .next()
        .unwrap_or_default();

    core.split('.')
        .map(|s| {
            let digits: String =
                s.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().unwrap_or(0)
        })
        .collect()
}

fn segment(parts: &[u64], idx: usize) -> u64 {
    parts.get(idx).copied().unwrap_or(0)
}

fn compare(current: &str, target: &str) -> Ordering {
    let a = segments(current);
    let b = segments(target);
    let len = a.len().max(b.len());

    for idx in 0..len {
        match segment(&a, idx).cmp(&segment(&b, idx)) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    Ordering::Equal
}

/// Classifies the delta between `current` and `target`.
pub fn classify(current: &str, target: &str) -> UpdateType {
    let a = segments(current);
    let b = segments(target);

    if segment(&a, 0) != segment(&b, 0) {
        UpdateType::Major
    } else if segment(&a, 1) != segment(&b, 1) {
        UpdateType::Minor
    } else {
        UpdateType::Patch
    }
}

/// True iff `target` strictly exceeds `current`.
pub fn is_newer(current: &str, target: &str) -> bool {
    compare(current, target) == Ordering::Less
}

/// Evaluates whether `version` satisfies `range`. Supports caret, tilde and
/// exact ranges; any other operator is treated as an exact match.
pub fn is_in_range(range: &str, version: &str) -> bool {
    let base = segments(range);
    let candidate = segments(version);
    let not_below = compare(range, version) != Ordering::Greater;

    match range_operator(range) {
        Some("^") => {
            segment(&base, 0) == segment(&candidate, 0) && not_below
        }
        Some("~") | Some("~>") => {
            segment(&base, 0) == segment(&candidate, 0)
                && segment(&base, 1) == segment(&candidate, 1)
                && not_below
        }
        _ => compare(range, version) == Ordering::Equal,
    }
}

/// True for unpinned markers such as `latest` or `*`.
pub fn is_dynamic(version: &str) -> bool {
    let trimmed = version.trim().to_lowercase();
    trimmed.is_empty() || DYNAMIC_MARKERS.contains(&trimmed.as_str())
}

/// Formats the value written back to a manifest. The range operator of
/// `current` is carried over unless `target` already has its own.
pub fn format_new_version(current: &str, target: &str) -> String {
    if range_operator(target).is_some() {
        return target.trim().to_string();
    }

    match range_operator(current) {
        Some(op) => format!("{op}{}", strip_operators(target)),
        None => strip_operators(target).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_first_differing_segment() {
        assert_eq!(classify("1.2.3", "2.0.0"), UpdateType::Major);
        assert_eq!(classify("1.2.3", "1.3.0"), UpdateType::Minor);
        assert_eq!(classify("1.2.3", "1.2.4"), UpdateType::Patch);
        assert_eq!(classify("0.9.9", "10.0.0"), UpdateType::Major);
    }

    #[test]
    fn classification_ignores_range_operators() {
        assert_eq!(classify("^1.2.3", "1.2.9"), UpdateType::Patch);
        assert_eq!(classify("~2.0.0", "2.1.0"), UpdateType::Minor);
        assert_eq!(classify(">=3.1.0", "4.0.0"), UpdateType::Major);
        assert_eq!(classify("v1.0.0", "v1.0.1"), UpdateType::Patch);
    }

    #[test]
    fn missing_segments_are_zero() {
        assert_eq!(classify("1", "1.0.1"), UpdateType::Patch);
        assert_eq!(classify("1.2", "1.3"), UpdateType::Minor);
        assert!(is_newer("1", "1.0.1"));
        assert!(!is_newer("1.0", "1.0.0"));
    }

    #[test]
    fn first_segment_increase_is_always_major() {
        for (a, b) in [("1.9.9", "2.0.0"), ("0.1.0", "1.0.0"), ("3", "7.1")] {
            assert_eq!(classify(a, b), UpdateType::Major, "{a} -> {b}");
            assert!(is_newer(a, b));
        }
    }

    #[test]
    fn is_newer_rejects_downgrades_and_equal_versions() {
        assert!(is_newer("1.2.3", "1.2.4"));
        assert!(is_newer("^1.2.3", "1.10.0"));
        assert!(!is_newer("1.2.3", "1.2.3"));
        assert!(!is_newer("2.0.0", "1.9.9"));
        assert!(!is_newer("~1.5.0", "1.4.9"));
    }

    #[test]
    fn prerelease_suffixes_are_ignored_for_ordering() {
        assert!(!is_newer("1.0.0-beta.1", "1.0.0"));
        assert!(!is_newer("1.0.0", "1.0.0+build.7"));
        assert_eq!(classify("1.0.0-rc.1", "1.0.1"), UpdateType::Patch);
    }

    #[test]
    fn caret_ranges_keep_major() {
        assert!(is_in_range("^1.2.3", "1.2.9"));
        assert!(is_in_range("^1.2.3", "1.9.0"));
        assert!(!is_in_range("^1.2.3", "2.0.0"));
        assert!(!is_in_range("^1.2.3", "1.2.2"));
    }

    #[test]
    fn tilde_ranges_keep_major_minor() {
        assert!(is_in_range("~2.0.0", "2.0.5"));
        assert!(!is_in_range("~2.0.0", "2.1.0"));
        assert!(!is_in_range("~2.0.3", "2.0.1"));
    }

    #[test]
    fn unknown_operators_degrade_to_exact_match() {
        assert!(is_in_range("1.2.3", "1.2.3"));
        assert!(!is_in_range("1.2.3", "1.2.4"));
        assert!(is_in_range(">=1.2.3", "1.2.3"));
        assert!(!is_in_range(">=1.2.3", "1.5.0"));
    }

    #[test]
    fn tilde_minor_bump_is_still_proposed() {
        assert!(!is_in_range("~2.0.0", "2.1.0"));
        assert!(is_newer("~2.0.0", "2.1.0"));
        assert_eq!(classify("~2.0.0", "2.1.0"), UpdateType::Minor);
    }

    #[test]
    fn formats_new_version_preserving_prefix() {
        assert_eq!(format_new_version("^1.2.3", "1.2.9"), "^1.2.9");
        assert_eq!(format_new_version("~2.0.0", "2.1.0"), "~2.1.0");
        assert_eq!(format_new_version(">=1.0.0", "1.4.0"), ">=1.4.0");
        assert_eq!(format_new_version("1.0.0", "1.4.0"), "1.4.0");
        assert_eq!(format_new_version("^1.0.0", "~1.4.0"), "~1.4.0");
    }

    #[test]
    fn detects_dynamic_markers() {
        assert!(is_dynamic("latest"));
        assert!(is_dynamic("*"));
        assert!(is_dynamic(" "));
        assert!(!is_dynamic("^1.0.0"));
    }

    #[test]
    fn strips_operators() {
        assert_eq!(strip_operators("^1.2.3"), "1.2.3");
        assert_eq!(strip_operators(">= 1.2.3"), "1.2.3");
        assert_eq!(strip_operators("~>2.0"), "2.0");
        assert_eq!(strip_operators("v3.0.0"), "3.0.0");
        assert_eq!(range_operator("1.0.0"), None);
        assert_eq!(range_operator("^1.0.0"), Some("^"));
    }
}
