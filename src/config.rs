//! Configuration loading and parsing for `buddy-bot.toml` files.
//!
//! Every field is optional; a repository without a configuration file gets
//! the defaults below.
use log::*;
use serde::Deserialize;
use std::path::Path;

use crate::{BuddyError, Result, update::Strategy};

/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "buddy-bot.toml";
/// Author login the engine's pull requests are opened under by default.
pub const DEFAULT_BOT_IDENTITY: &str = "github-actions[bot]";
/// Label applied to every pull request this engine opens.
pub const DEFAULT_LABEL: &str = "dependencies";
/// Orphans older than this are deleted when only a fallback detection ran.
pub const DEFAULT_MAX_BRANCH_AGE_DAYS: u64 = 7;

/// A named group of packages that should share one pull request.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GroupConfig {
    /// Group name, used for the title and branch slug
    pub name: String,
    /// Glob-style package name patterns (e.g. "@types/*", "eslint*")
    pub patterns: Vec<String>,
    /// Optional strategy overriding the global one for this group
    pub strategy: Option<Strategy>,
}

/// Branch cleanup settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CleanupConfig {
    /// Runs branch cleanup at the end of an update pass (default: true)
    pub enabled: bool,
    /// Age cutoff applied when orphan detection fell back to a heuristic
    pub max_age_days: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_days: DEFAULT_MAX_BRANCH_AGE_DAYS,
        }
    }
}

/// Root configuration structure for `buddy-bot.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Which update severities to propose
    pub strategy: Strategy,
    /// Glob patterns of package names that are never updated
    pub ignore: Vec<String>,
    /// Never replace unpinned markers such as "latest" or "*"
    pub respect_latest: bool,
    /// Extra labels added to every pull request
    pub labels: Vec<String>,
    /// Reviewers requested on new and refreshed pull requests
    pub reviewers: Vec<String>,
    /// Assignees added to new pull requests
    pub assignees: Vec<String>,
    /// Branch pull requests target (default: repository default branch)
    pub base_branch: Option<String>,
    /// Login pull requests are authored by
    pub bot_identity: String,
    /// Explicit groups, evaluated in order
    #[serde(rename = "group")]
    pub groups: Vec<GroupConfig>,
    pub cleanup: CleanupConfig,
    /// Keeps a tracking issue listing every group's pull request
    pub dashboard: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: Strategy::All,
            ignore: vec![],
            respect_latest: true,
            labels: vec![DEFAULT_LABEL.into()],
            reviewers: vec![],
            assignees: vec![],
            base_branch: None,
            bot_identity: DEFAULT_BOT_IDENTITY.into(),
            groups: vec![],
            cleanup: CleanupConfig::default(),
            dashboard: false,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(
                "no configuration found at {}: using default",
                path.display()
            );
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            BuddyError::invalid_config(format!(
                "failed to parse {}: {e}",
                path.display()
            ))
        })?;

        debug!("loaded configuration: {:#?}", config);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loads_defaults() {
        let config = Config::default();
        assert_eq!(config.strategy, Strategy::All);
        assert_eq!(config.bot_identity, DEFAULT_BOT_IDENTITY);
        assert_eq!(config.cleanup.max_age_days, DEFAULT_MAX_BRANCH_AGE_DAYS);
        assert!(config.respect_latest);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(&temp_dir.path().join(DEFAULT_CONFIG_FILE))
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn parses_groups_and_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            r#"
strategy = "minor"
ignore = ["left-pad", "@internal/*"]
labels = ["deps", "automerge"]
reviewers = ["octocat"]
dashboard = true

[[group]]
name = "Types"
patterns = ["@types/*"]

[[group]]
name = "Lint"
patterns = ["eslint*", "prettier"]
strategy = "patch"

[cleanup]
max_age_days = 14
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.strategy, Strategy::Minor);
        assert_eq!(config.ignore.len(), 2);
        assert_eq!(config.groups.len(), 2);
        assert_eq!(config.groups[1].strategy, Some(Strategy::Patch));
        assert_eq!(config.cleanup.max_age_days, 14);
        assert!(config.cleanup.enabled);
        assert!(config.dashboard);
        assert_eq!(config.bot_identity, DEFAULT_BOT_IDENTITY);
    }

    #[test]
    fn keys_below_a_group_table_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            "[[group]]\nname = \"Types\"\npatterns = [\"@types/*\"]\n\ndashboard = true\n",
        )
        .unwrap();

        let result = Config::load(&path);

        assert!(matches!(result, Err(BuddyError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_unknown_strategy() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "strategy = \"sometimes\"").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
