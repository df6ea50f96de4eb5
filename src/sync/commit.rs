//! Lands a group's file changes on its branch. Commits go through the local
//! git workspace when one is available and through the forge API otherwise.
//! A rejection caused by workflow files drops those files and retries with
//! the rest.
use log::*;

use crate::{
    BuddyError, Result,
    forge::{
        config::PRIVILEGED_PATH_PREFIX,
        manager::ForgeManager,
        request::{CreateBranchRequest, CreateCommitRequest, FileChange},
    },
    workspace::Workspace,
};

/// What ended up on the branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every change was committed
    Committed { sha: String },
    /// The branch already held this content; nothing was pushed
    NoOp,
    /// Changes under privileged paths were rejected and left out
    Degraded { sha: String, dropped: Vec<String> },
    /// Only privileged changes existed; an empty commit records the skip
    Marker { sha: String },
}

impl CommitOutcome {
    pub fn is_noop(&self) -> bool {
        matches!(self, CommitOutcome::NoOp)
    }
}

pub struct CommitTarget<'a> {
    pub branch: &'a str,
    pub base_branch: &'a str,
    pub message: &'a str,
}

pub fn is_privileged(path: &str) -> bool {
    path.trim_start_matches("./")
        .starts_with(PRIVILEGED_PATH_PREFIX)
}

/// Commits `changes` onto `target.branch`.
pub async fn commit_changes(
    forge: &ForgeManager,
    workspace: Option<&dyn Workspace>,
    target: &CommitTarget<'_>,
    changes: Vec<FileChange>,
) -> Result<CommitOutcome> {
    if let Some(workspace) = workspace {
        match native_commit(workspace, target, &changes) {
            Ok(Some(sha)) => return Ok(CommitOutcome::Committed { sha }),
            Ok(None) => return Ok(CommitOutcome::NoOp),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) if err.is_permission_denied() => {
                warn!(
                    "push of {} rejected: {err}: retrying without privileged files",
                    target.branch
                );
                ensure_remote_branch(forge, target).await?;
                return degrade(forge, target, changes, err).await;
            }
            Err(err) => {
                warn!(
                    "local commit on {} failed: {err}: falling back to the API",
                    target.branch
                );
                ensure_remote_branch(forge, target).await?;
            }
        }
    }

    api_commit(forge, target, changes).await
}

fn native_commit(
    workspace: &dyn Workspace,
    target: &CommitTarget<'_>,
    changes: &[FileChange],
) -> Result<Option<String>> {
    workspace.write_files(changes)?;

    if !workspace.has_changes()? {
        info!("branch {} already holds these changes", target.branch);
        return Ok(None);
    }

    let sha = workspace.commit(target.message)?;
    workspace.push(target.branch, false)?;

    debug!("pushed {sha} to {}", target.branch);

    Ok(Some(sha))
}

async fn ensure_remote_branch(
    forge: &ForgeManager,
    target: &CommitTarget<'_>,
) -> Result<()> {
    if forge.get_branch(target.branch).await?.is_none() {
        forge
            .create_branch(CreateBranchRequest {
                branch: target.branch.to_string(),
                base_branch: target.base_branch.to_string(),
            })
            .await?;
    }

    Ok(())
}

async fn api_commit(
    forge: &ForgeManager,
    target: &CommitTarget<'_>,
    changes: Vec<FileChange>,
) -> Result<CommitOutcome> {
    let result = forge
        .create_commit(CreateCommitRequest {
            branch: target.branch.to_string(),
            message: target.message.to_string(),
            file_changes: changes.clone(),
            allow_empty: false,
        })
        .await;

    match result {
        Ok(Some(commit)) => Ok(CommitOutcome::Committed { sha: commit.sha }),
        Ok(None) => {
            info!("branch {} already holds these changes", target.branch);
            Ok(CommitOutcome::NoOp)
        }
        Err(err) if err.is_permission_denied() => {
            warn!(
                "commit to {} rejected: {err}: retrying without privileged files",
                target.branch
            );
            degrade(forge, target, changes, err).await
        }
        Err(err) => Err(err),
    }
}

async fn degrade(
    forge: &ForgeManager,
    target: &CommitTarget<'_>,
    changes: Vec<FileChange>,
    cause: BuddyError,
) -> Result<CommitOutcome> {
    let (privileged, remaining): (Vec<FileChange>, Vec<FileChange>) =
        changes.into_iter().partition(|c| is_privileged(&c.path));

    if privileged.is_empty() {
        return Err(cause);
    }

    let dropped = privileged
        .into_iter()
        .map(|c| c.path)
        .collect::<Vec<String>>();

    warn!(
        "leaving out {} privileged file(s) from {}: {}",
        dropped.len(),
        target.branch,
        dropped.join(", ")
    );

    if remaining.is_empty() {
        let commit = forge
            .create_commit(CreateCommitRequest {
                branch: target.branch.to_string(),
                message: format!(
                    "{}\n\nWorkflow file updates were skipped: the token lacks permission to modify {}",
                    target.message, PRIVILEGED_PATH_PREFIX
                ),
                file_changes: vec![],
                allow_empty: true,
            })
            .await?
            .ok_or_else(|| {
                BuddyError::forge(format!(
                    "marker commit on {} was not created",
                    target.branch
                ))
            })?;

        return Ok(CommitOutcome::Marker { sha: commit.sha });
    }

    let commit = forge
        .create_commit(CreateCommitRequest {
            branch: target.branch.to_string(),
            message: target.message.to_string(),
            file_changes: remaining,
            allow_empty: false,
        })
        .await?;

    match commit {
        Some(commit) => Ok(CommitOutcome::Degraded {
            sha: commit.sha,
            dropped,
        }),
        None => Ok(CommitOutcome::NoOp),
    }
}
