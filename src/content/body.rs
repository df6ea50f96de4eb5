use regex::Regex;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::LazyLock,
};

use crate::{update::PackageUpdate, version};

/// Hidden marker identifying bodies rendered by this engine.
pub const BODY_MARKER: &str = "<!-- buddy-bot -->";

static TABLE_ROW_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\|\s*\[?`(?<name>[^`]+)`\]?(?:\([^)]*\))?\s*\|\s*`(?<from>[^`]*)`\s*(?:→|->)\s*`(?<to>[^`]+)`",
    )
    .unwrap()
});

/// One row of the package table in an existing pull-request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub from: String,
    pub to: String,
}

pub fn render(updates: &[PackageUpdate]) -> String {
    let mut rows = vec![];

    for update in updates.iter() {
        rows.push(format!(
            "| `{}` | `{}` → `{}` | {} | `{}` |",
            update.name,
            update.current_version,
            update.new_version,
            update.update_type,
            update.source_file,
        ));
    }

    format!(
        "{BODY_MARKER}\nThis PR contains the following updates:\n\n| Package | Change | Type | File |\n|---|---|---|---|\n{}\n\n---\n\nThis PR is kept up to date automatically. Close it to ignore these updates until a newer version is released.\n",
        rows.join("\n")
    )
}

/// Parses the package table of a rendered body into `name -> {from, to}`.
pub fn parse_package_table(body: &str) -> BTreeMap<String, TableEntry> {
    TABLE_ROW_REGEX
        .captures_iter(body)
        .map(|c| {
            (
                c["name"].to_string(),
                TableEntry {
                    from: c["from"].to_string(),
                    to: c["to"].to_string(),
                },
            )
        })
        .collect()
}

/// True only when every incoming update already appears in `body` with the
/// same target version and the table holds exactly as many packages, so a
/// strict subset never passes as identical.
pub fn is_identical(body: &str, updates: &[PackageUpdate]) -> bool {
    let table = parse_package_table(body);

    if table.is_empty() {
        return false;
    }

    let names = updates
        .iter()
        .map(|u| u.name.as_str())
        .collect::<BTreeSet<&str>>();

    if names.len() != table.len() {
        return false;
    }

    updates.iter().all(|u| {
        table.get(&u.name).is_some_and(|entry| {
            version::strip_operators(&entry.to)
                == version::strip_operators(&u.new_version)
        })
    })
}

/// Packages whose recorded current version is an unpinned marker such as
/// `latest` or `*`.
pub fn dynamic_packages(body: &str) -> Vec<String> {
    parse_package_table(body)
        .into_iter()
        .filter(|(_, entry)| version::is_dynamic(&entry.from))
        .map(|(name, _)| name)
        .collect()
}
