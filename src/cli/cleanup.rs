//! Deletes orphaned branches left behind by merged or closed pull requests.
use log::*;
use std::rc::Rc;

use crate::{
    Result,
    cleanup::{BranchCleaner, CleanupSettings},
    cli::{Args, common},
};

pub async fn execute(args: &Args) -> Result<()> {
    let config = common::load_config(args)?;
    let forge = common::create_forge_manager(args).await?;

    let cleaner = BranchCleaner::new(
        Rc::clone(&forge),
        CleanupSettings::from_config(&config.cleanup)?,
    );

    match cleaner.run().await {
        Ok(report) => {
            for failure in report.failures.iter() {
                warn!("could not delete {}: {}", failure.branch, failure.reason);
            }
            Ok(())
        }
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            error!("branch cleanup aborted: {err}");
            Ok(())
        }
    }
}
