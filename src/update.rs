//! Scan-scoped data model: package updates and the groups they are batched
//! into.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::content::{body, title};

/// Severity of a version bump. Ordered so that `Major` is the highest.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    #[default]
    Patch,
    Minor,
    Major,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Patch => "patch",
            UpdateType::Minor => "minor",
            UpdateType::Major => "major",
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Update-type filter controlling which severities are proposed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Keep every update
    Patch,
    /// Drop major updates
    Minor,
    /// Keep only major updates
    Major,
    #[default]
    All,
}

impl Strategy {
    pub fn allows(&self, update_type: UpdateType) -> bool {
        match self {
            Strategy::Patch | Strategy::All => true,
            Strategy::Minor => update_type != UpdateType::Major,
            Strategy::Major => update_type == UpdateType::Major,
        }
    }
}

/// Section of the manifest a dependency was declared in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DependencyType {
    #[default]
    Dependencies,
    DevDependencies,
    PeerDependencies,
    OptionalDependencies,
    BuildDependencies,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::Dependencies => "dependencies",
            DependencyType::DevDependencies => "devDependencies",
            DependencyType::PeerDependencies => "peerDependencies",
            DependencyType::OptionalDependencies => "optionalDependencies",
            DependencyType::BuildDependencies => "buildDependencies",
        }
    }
}

/// A single proposed dependency change produced by a manifest handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageUpdate {
    pub name: String,
    /// Version as currently declared, including any range operator
    pub current_version: String,
    /// Proposed version without a range operator
    pub new_version: String,
    pub update_type: UpdateType,
    pub dependency_type: DependencyType,
    /// Manifest path relative to the repository root
    pub source_file: String,
}

/// A set of package updates batched into one pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroup {
    pub name: String,
    pub update_type: UpdateType,
    pub title: String,
    pub body: String,
    pub updates: Vec<PackageUpdate>,
}

impl UpdateGroup {
    pub fn new(name: impl Into<String>, updates: Vec<PackageUpdate>) -> Self {
        let name = name.into();
        let update_type = Self::highest_severity(&updates);
        let title = title::render(&name, update_type, &updates);
        let body = body::render(&updates);

        Self {
            name,
            update_type,
            title,
            body,
            updates,
        }
    }

    /// Lowercased group name with spaces replaced by dashes.
    pub fn slug(&self) -> String {
        self.name.to_lowercase().replace(' ', "-")
    }

    fn highest_severity(updates: &[PackageUpdate]) -> UpdateType {
        updates
            .iter()
            .map(|u| u.update_type)
            .max()
            .unwrap_or_default()
    }
}
