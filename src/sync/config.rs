use derive_builder::Builder;
use std::rc::Rc;

use crate::{BuddyError, Result, config::Config};

#[derive(Debug, Builder)]
#[builder(setter(into), build_fn(private, name = "_build"))]
pub struct SyncConfigParams {
    pub toml_config: Rc<Config>,
    pub repo_default_branch: String,
}

impl SyncConfigParamsBuilder {
    pub fn build(&self) -> Result<SyncConfig> {
        let params = self._build().map_err(|e| {
            BuddyError::invalid_config(format!(
                "Failed to build sync config: {}",
                e
            ))
        })?;
        SyncConfig::new(params)
    }
}

/// Settings the sync engine needs, resolved from the loaded configuration
/// and the repository.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub base_branch: String,
    pub bot_identity: String,
    pub respect_latest: bool,
    pub labels: Vec<String>,
    pub reviewers: Vec<String>,
    pub assignees: Vec<String>,
}

impl SyncConfig {
    pub fn builder() -> SyncConfigParamsBuilder {
        SyncConfigParamsBuilder::default()
    }

    pub fn new(params: SyncConfigParams) -> Result<Self> {
        let config = params.toml_config;

        let base_branch = config
            .base_branch
            .clone()
            .unwrap_or(params.repo_default_branch);

        if base_branch.trim().is_empty() {
            return Err(BuddyError::invalid_config(
                "base branch must not be empty",
            ));
        }

        if config.bot_identity.trim().is_empty() {
            return Err(BuddyError::invalid_config(
                "bot_identity must not be empty",
            ));
        }

        Ok(Self {
            base_branch,
            bot_identity: config.bot_identity.clone(),
            respect_latest: config.respect_latest,
            labels: config.labels.clone(),
            reviewers: config.reviewers.clone(),
            assignees: config.assignees.clone(),
        })
    }
}
