//! Keeps exactly one open pull request per update group.
//!
//! Each pass lists the open pull requests once, then walks the groups in
//! order. A group either reuses the pull request that already represents it
//! (skipping it when nothing changed, refreshing it otherwise) or gets a new
//! branch and pull request. A pull request is claimed by at most one group
//! per pass.
use chrono::Utc;
use derive_builder::Builder;
use log::*;
use serde::Serialize;
use std::{cell::Cell, collections::HashSet, rc::Rc};

use crate::{
    BuddyError, Result,
    content::body,
    file_loader::WorkingTreeLoader,
    forge::{
        manager::ForgeManager,
        request::{
            CreateBranchRequest, CreatePrRequest, FileChange,
            PrAssigneesRequest, PrLabelsRequest, PrReviewersRequest,
            PullRequestRecord, UpdatePrRequest,
        },
    },
    manifest::ManifestRegistry,
    sync::{
        commit::{CommitOutcome, CommitTarget},
        config::SyncConfig,
    },
    update::UpdateGroup,
    workspace::{MergeOutcome, Workspace},
};

pub mod commit;
pub mod config;
pub mod labels;
pub mod matching;


/// Terminal state of one group in a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SyncOutcome {
    /// Nothing to do; carries the matched pull request when there was one
    Skipped { pr_number: Option<u64> },
    Refreshed { pr_number: u64 },
    Created { pr_number: u64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResult {
    pub group: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

/// Per-group outcomes of a sync pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncReport {
    pub results: Vec<GroupResult>,
}

impl SyncReport {
    fn record(&mut self, group: &str, outcome: SyncOutcome) {
        self.results.push(GroupResult {
            group: group.to_string(),
            outcome,
        });
    }

    pub fn outcome_for(&self, group: &str) -> Option<&SyncOutcome> {
        self.results
            .iter()
            .find(|r| r.group == group)
            .map(|r| &r.outcome)
    }

    pub fn count(&self, f: impl Fn(&SyncOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| f(&r.outcome)).count()
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Failed { .. }))
    }
}

#[derive(Builder)]
#[builder(setter(into), build_fn(private, name = "_build"))]
pub struct SyncParams {
    pub config: Rc<SyncConfig>,
    pub forge: Rc<ForgeManager>,
    pub manifests: Rc<ManifestRegistry>,
    /// Local clone used for native commits; the forge API is used without it
    #[builder(default)]
    pub workspace: Option<Rc<dyn Workspace>>,
}

impl SyncParamsBuilder {
    pub fn build(&self) -> Result<SyncEngine> {
        let params = self._build().map_err(|e| {
            BuddyError::invalid_config(format!(
                "Failed to build sync engine: {}",
                e
            ))
        })?;
        Ok(SyncEngine::new(params))
    }
}

pub struct SyncEngine {
    config: Rc<SyncConfig>,
    forge: Rc<ForgeManager>,
    manifests: Rc<ManifestRegistry>,
    workspace: Option<Rc<dyn Workspace>>,
    last_branch_timestamp: Cell<i64>,
}

impl SyncEngine {
    pub fn builder() -> SyncParamsBuilder {
        SyncParamsBuilder::default()
    }

    pub fn new(params: SyncParams) -> Self {
        Self {
            config: params.config,
            forge: params.forge,
            manifests: params.manifests,
            workspace: params.workspace,
            last_branch_timestamp: Cell::new(0),
        }
    }

    /// Reconciles every group with its pull request. Errors scoped to a
    /// group are recorded in the report; fatal errors abort the pass.
    pub async fn sync(&self, groups: &[UpdateGroup]) -> Result<SyncReport> {
        let open_prs = self.forge.list_open_pull_requests().await?;

        info!(
            "syncing {} group(s) against {} open pull request(s)",
            groups.len(),
            open_prs.len()
        );

        let mut claimed = HashSet::new();
        let mut report = SyncReport::default();

        for group in groups.iter() {
            let outcome =
                match self.sync_group(group, &open_prs, &mut claimed).await {
                    Ok(outcome) => outcome,
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        error!("failed to sync group {}: {err}", group.name);
                        SyncOutcome::Failed {
                            reason: err.to_string(),
                        }
                    }
                };

            info!("group {}: {:?}", group.name, outcome);
            report.record(&group.name, outcome);
        }

        Ok(report)
    }

    async fn sync_group(
        &self,
        group: &UpdateGroup,
        open_prs: &[PullRequestRecord],
        claimed: &mut HashSet<u64>,
    ) -> Result<SyncOutcome> {
        let candidates = open_prs
            .iter()
            .filter(|pr| !claimed.contains(&pr.number))
            .collect::<Vec<&PullRequestRecord>>();

        let Some((pr, kind)) = matching::find_match(
            &candidates,
            group,
            &self.config.bot_identity,
        ) else {
            return self.create_new(group).await;
        };

        debug!(
            "group {} matched PR #{} by {:?}",
            group.name, pr.number, kind
        );

        claimed.insert(pr.number);

        if self.config.respect_latest && self.pins_dynamic_version(pr, group) {
            self.close_for_policy(pr).await?;
            return self.create_new(group).await;
        }

        if body::is_identical(&pr.body, &group.updates) {
            info!(
                "PR #{} already proposes these updates: skipping",
                pr.number
            );
            return Ok(SyncOutcome::Skipped {
                pr_number: Some(pr.number),
            });
        }

        self.refresh_existing(pr, group).await
    }

    /// True when `pr` replaces an unpinned marker that the current scan no
    /// longer proposes to touch.
    fn pins_dynamic_version(
        &self,
        pr: &PullRequestRecord,
        group: &UpdateGroup,
    ) -> bool {
        body::dynamic_packages(&pr.body)
            .iter()
            .any(|name| !group.updates.iter().any(|u| &u.name == name))
    }

    async fn close_for_policy(&self, pr: &PullRequestRecord) -> Result<()> {
        warn!(
            "PR #{} pins a dynamic version marker: closing it",
            pr.number
        );

        self.forge
            .comment_on_pr(
                pr.number,
                "Closing: this pull request replaces an unpinned version marker such as `latest` or `*`, which the current configuration keeps as is. A replacement will be opened if other updates remain.",
            )
            .await?;

        self.forge.close_pr(pr.number).await?;

        if let Err(err) = self.forge.delete_branch(&pr.head_branch).await {
            warn!("failed to delete branch {}: {err}", pr.head_branch);
        }

        Ok(())
    }

    /// The workspace, unless a local git step already failed for the
    /// current group.
    fn native(&self, native: bool) -> Option<&dyn Workspace> {
        self.workspace.as_deref().filter(|_| native)
    }

    /// Logs a failed local git step. Fatal errors propagate, anything else
    /// moves the group onto the forge API.
    fn fall_back_to_api(&self, step: &str, err: BuddyError) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }

        warn!("{step} failed: {err}: continuing through the API");

        Ok(())
    }

    /// Computes the group's file changes against the base branch. When a
    /// workspace is present it is reset to the base first. The returned flag
    /// tells whether the local workspace is still usable for this group.
    async fn generate_changes(
        &self,
        group: &UpdateGroup,
    ) -> Result<(Vec<FileChange>, bool)> {
        let base = &self.config.base_branch;

        if let Some(workspace) = &self.workspace {
            match workspace.reset_to_base(base).and_then(|_| workspace.root()) {
                Ok(root) => {
                    let loader = WorkingTreeLoader::new(root);
                    let changes = self
                        .manifests
                        .generate_changes(&loader, None, &group.updates)
                        .await?;
                    return Ok((changes, true));
                }
                Err(err) => {
                    self.fall_back_to_api(&format!("resetting to {base}"), err)?
                }
            }
        }

        let changes = self
            .manifests
            .generate_changes(
                self.forge.as_ref(),
                Some(base.clone()),
                &group.updates,
            )
            .await?;

        Ok((changes, false))
    }

    async fn refresh_existing(
        &self,
        pr: &PullRequestRecord,
        group: &UpdateGroup,
    ) -> Result<SyncOutcome> {
        info!("refreshing PR #{} for group {}", pr.number, group.name);

        let (changes, mut native) = self.generate_changes(group).await?;

        if changes.is_empty() {
            info!("base branch already contains updates for {}", group.name);
            return Ok(SyncOutcome::Skipped {
                pr_number: Some(pr.number),
            });
        }

        if let Some(workspace) = self.native(native)
            && let Err(err) = workspace.checkout_existing(&pr.head_branch)
        {
            self.fall_back_to_api(
                &format!("checking out {}", pr.head_branch),
                err,
            )?;
            native = false;
        }

        if let Some(workspace) = self.native(native) {
            match workspace.merge_base(&self.config.base_branch) {
                Ok(MergeOutcome::Unresolved(reason)) => warn!(
                    "could not merge {} into {}: {reason}: continuing",
                    self.config.base_branch, pr.head_branch
                ),
                Ok(outcome) => debug!(
                    "merged {} into {}: {:?}",
                    self.config.base_branch, pr.head_branch, outcome
                ),
                Err(err) => warn!(
                    "merge of {} into {} failed: {err}: continuing",
                    self.config.base_branch, pr.head_branch
                ),
            }
        }

        let outcome = self
            .commit(&pr.head_branch, group, changes, native)
            .await?;

        if outcome.is_noop() {
            info!("PR #{} content unchanged: skipping", pr.number);
            return Ok(SyncOutcome::Skipped {
                pr_number: Some(pr.number),
            });
        }

        self.forge
            .update_pr(UpdatePrRequest {
                pr_number: pr.number,
                title: group.title.clone(),
                body: group.body.clone(),
            })
            .await?;

        self.decorate(pr.number, group, false).await;

        Ok(SyncOutcome::Refreshed {
            pr_number: pr.number,
        })
    }

    async fn create_new(&self, group: &UpdateGroup) -> Result<SyncOutcome> {
        let branch = self.next_branch_name(group);
        let base = self.config.base_branch.clone();

        info!("creating {branch} for group {}", group.name);

        let (changes, mut native) = self.generate_changes(group).await?;

        if changes.is_empty() {
            info!("no file changes for group {}: skipping", group.name);
            return Ok(SyncOutcome::Skipped { pr_number: None });
        }

        if let Some(workspace) = self.native(native)
            && let Err(err) = workspace.create_branch(&branch)
        {
            self.fall_back_to_api(&format!("creating {branch} locally"), err)?;
            native = false;
        }

        if !native {
            self.forge
                .create_branch(CreateBranchRequest {
                    branch: branch.clone(),
                    base_branch: base.clone(),
                })
                .await?;
        }

        let outcome = self.commit(&branch, group, changes, native).await?;

        if outcome.is_noop() {
            info!("nothing committed for group {}: skipping", group.name);
            // only the API path has already published the branch
            if !native
                && let Err(err) = self.forge.delete_branch(&branch).await
            {
                warn!("failed to delete empty branch {branch}: {err}");
            }
            return Ok(SyncOutcome::Skipped { pr_number: None });
        }

        let pr = self
            .forge
            .create_pr(CreatePrRequest {
                head_branch: branch,
                base_branch: base,
                title: group.title.clone(),
                body: group.body.clone(),
            })
            .await?;

        self.decorate(pr.number, group, true).await;

        Ok(SyncOutcome::Created {
            pr_number: pr.number,
        })
    }

    async fn commit(
        &self,
        branch: &str,
        group: &UpdateGroup,
        changes: Vec<FileChange>,
        native: bool,
    ) -> Result<CommitOutcome> {
        let target = CommitTarget {
            branch,
            base_branch: &self.config.base_branch,
            message: &group.title,
        };

        let outcome = commit::commit_changes(
            &self.forge,
            self.native(native),
            &target,
            changes,
        )
        .await?;

        match &outcome {
            CommitOutcome::Degraded { dropped, .. } => warn!(
                "{branch} was committed without: {}",
                dropped.join(", ")
            ),
            CommitOutcome::Marker { sha } => warn!(
                "{branch} only had privileged changes: recorded marker commit {sha}"
            ),
            _ => {}
        }

        Ok(outcome)
    }

    /// Applies labels, reviewers and, for new pull requests, assignees.
    /// Failures here never undo the pull request itself.
    async fn decorate(&self, pr_number: u64, group: &UpdateGroup, is_new: bool) {
        let labels = labels::labels_for(group, &self.config.labels);

        if let Err(err) = self
            .forge
            .add_pr_labels(PrLabelsRequest { pr_number, labels })
            .await
        {
            warn!("failed to label PR #{pr_number}: {err}");
        }

        if let Err(err) = self
            .forge
            .add_pr_reviewers(PrReviewersRequest {
                pr_number,
                reviewers: self.config.reviewers.clone(),
            })
            .await
        {
            warn!("failed to request reviewers on PR #{pr_number}: {err}");
        }

        if !is_new {
            return;
        }

        if let Err(err) = self
            .forge
            .add_pr_assignees(PrAssigneesRequest {
                pr_number,
                assignees: self.config.assignees.clone(),
            })
            .await
        {
            warn!("failed to assign PR #{pr_number}: {err}");
        }
    }

    /// Millisecond timestamp suffix, strictly increasing within a run.
    fn next_branch_name(&self, group: &UpdateGroup) -> String {
        let now = Utc::now().timestamp_millis();
        let timestamp = now.max(self.last_branch_timestamp.get() + 1);
        self.last_branch_timestamp.set(timestamp);
        format!("{}{timestamp}", matching::branch_prefix(group))
    }
}
