//! Scans manifests and reconciles one pull request per update group.
use log::*;
use std::rc::Rc;

use crate::{
    Result,
    cleanup::{BranchCleaner, CleanupSettings},
    cli::{Args, common},
    dashboard,
    manifest::ManifestRegistry,
    sync::{SyncEngine, SyncOutcome, config::SyncConfig},
};

pub async fn execute(args: &Args, no_cleanup: bool) -> Result<()> {
    let config = common::load_config(args)?;
    let forge = common::create_forge_manager(args).await?;

    let sync_config = Rc::new(
        SyncConfig::builder()
            .toml_config(Rc::clone(&config))
            .repo_default_branch(forge.default_branch())
            .build()?,
    );

    let workspace = common::open_workspace(args, &forge);

    // scan what the base branch declares, not whatever is checked out
    if let Some(workspace) = workspace.as_ref()
        && let Err(err) = workspace.reset_to_base(&sync_config.base_branch)
    {
        warn!("failed to check out {}: {err}", sync_config.base_branch);
    }

    let manifests = Rc::new(ManifestRegistry::with_defaults()?);
    let groups =
        common::scan_groups(&config, &manifests, &args.repo_path).await?;

    let engine = SyncEngine::builder()
        .config(Rc::clone(&sync_config))
        .forge(Rc::clone(&forge))
        .manifests(manifests)
        .workspace(workspace)
        .build()?;

    match engine.sync(&groups).await {
        Ok(report) => {
            info!(
                "sync finished: {} created, {} refreshed, {} skipped, {} failed",
                report.count(|o| matches!(o, SyncOutcome::Created { .. })),
                report.count(|o| matches!(o, SyncOutcome::Refreshed { .. })),
                report.count(|o| matches!(o, SyncOutcome::Skipped { .. })),
                report.failed()
            );

            if config.dashboard
                && let Err(err) =
                    dashboard::publish(&forge, &groups, &report).await
            {
                warn!("failed to publish dependency dashboard: {err}");
            }
        }
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => error!("sync pass aborted: {err}"),
    }

    if !config.cleanup.enabled || no_cleanup {
        info!("branch cleanup disabled");
        return Ok(());
    }

    let cleaner = BranchCleaner::new(
        Rc::clone(&forge),
        CleanupSettings::from_config(&config.cleanup)?,
    );

    if let Err(err) = cleaner.run().await {
        if err.is_fatal() {
            return Err(err);
        }
        error!("branch cleanup aborted: {err}");
    }

    Ok(())
}
