//! Setup shared between commands
use log::*;
use std::{path::PathBuf, rc::Rc};

use crate::{
    Result,
    cli::Args,
    config::{Config, DEFAULT_CONFIG_FILE},
    forge::{github::Github, manager::ForgeManager},
    grouping::GroupingEngine,
    manifest::ManifestRegistry,
    scanner::UpdateScanner,
    update::UpdateGroup,
    workspace::{GitWorkspace, Workspace},
};

/// Path of the configuration file: `--config` or the repository default.
pub fn config_path(args: &Args) -> PathBuf {
    args.config
        .clone()
        .unwrap_or_else(|| args.repo_path.join(DEFAULT_CONFIG_FILE))
}

pub fn load_config(args: &Args) -> Result<Rc<Config>> {
    Ok(Rc::new(Config::load(&config_path(args))?))
}

/// Connects to the remote. Missing repository or token fails here, before
/// anything is written.
pub async fn create_forge_manager(args: &Args) -> Result<Rc<ForgeManager>> {
    let remote = args.get_remote()?;

    if remote.dry_run {
        warn!("dry run enabled: remote writes will only be logged");
    }

    let forge = Github::new(remote).await?;

    Ok(Rc::new(ForgeManager::new(Box::new(forge))))
}

/// Local clone used for native commits. Dry runs never push, so they get
/// no workspace and every write goes through the dry-run aware forge.
pub fn open_workspace(
    args: &Args,
    forge: &ForgeManager,
) -> Option<Rc<dyn Workspace>> {
    if forge.dry_run() {
        return None;
    }

    match GitWorkspace::open(&args.repo_path, forge.remote_config().token) {
        Ok(workspace) => Some(Rc::new(workspace)),
        Err(err) => {
            warn!(
                "no usable git clone at {}: {err}: committing through the API",
                args.repo_path.display()
            );
            None
        }
    }
}

/// Scans `root` and partitions the proposed updates into groups.
pub async fn scan_groups(
    config: &Config,
    manifests: &ManifestRegistry,
    root: &std::path::Path,
) -> Result<Vec<UpdateGroup>> {
    let scanner = UpdateScanner::new(config, manifests)?;
    let updates = scanner.scan(root).await?;

    info!("found {} update(s)", updates.len());

    let groups = GroupingEngine::new(&config.groups)?.group(updates);

    for group in groups.iter() {
        info!(
            "group {} ({}): {} update(s)",
            group.name,
            group.update_type,
            group.updates.len()
        );
    }

    Ok(groups)
}
