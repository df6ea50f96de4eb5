//! Deletes branches this engine created once no open pull request uses them.
//!
//! Whether a branch still backs an open pull request is decided by the
//! strongest signal available:
//!
//! 1. pull request head refs matched by tip SHA, with each candidate pull
//!    request's state checked over HTTP
//! 2. branches committed to in the last 24 hours are kept
//! 3. branches committed to in the last 30 days are kept
//! 4. everything is kept
//!
//! After the first layer every orphan is deleted. After a fallback layer only
//! orphans older than the configured age cutoff are deleted.
use chrono::{Duration as ChronoDuration, Utc};
use derive_builder::Builder;
use futures_util::future::join_all;
use log::*;
use rand::Rng;
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
    time::Duration,
};

use crate::{
    BuddyError, Result,
    config::{CleanupConfig, DEFAULT_MAX_BRANCH_AGE_DAYS},
    forge::{
        config::BRANCH_PREFIX,
        manager::ForgeManager,
        request::{PrState, PullHead, RemoteBranch},
    },
};


pub const BATCH_SIZE: usize = 5;
pub const STATE_CHECK_MAX_JITTER: Duration = Duration::from_millis(100);
pub const STATE_CHECK_BATCH_DELAY: Duration = Duration::from_millis(500);
pub const DELETE_BATCH_DELAY: Duration = Duration::from_secs(3);
pub const RECENT_WINDOW_HOURS: i64 = 24;
pub const EXTENDED_WINDOW_DAYS: i64 = 30;

/// Which detection layer decided what is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionStrategy {
    PullRequestHeads,
    RecentCommits,
    ExtendedRecentCommits,
    ProtectAll,
}

impl DetectionStrategy {
    pub fn is_primary(&self) -> bool {
        matches!(self, DetectionStrategy::PullRequestHeads)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFailure {
    pub branch: String,
    pub reason: String,
}

/// Summary of a cleanup pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub strategy: DetectionStrategy,
    pub scanned: usize,
    pub protected: Vec<String>,
    pub deleted: Vec<String>,
    /// Orphans kept because they are younger than the age cutoff
    pub retained: Vec<String>,
    pub failures: Vec<DeleteFailure>,
}

#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(private, name = "_build"))]
pub struct CleanupSettings {
    #[builder(default = "BATCH_SIZE")]
    pub batch_size: usize,
    #[builder(default = "STATE_CHECK_MAX_JITTER")]
    pub state_check_jitter: Duration,
    #[builder(default = "STATE_CHECK_BATCH_DELAY")]
    pub state_check_batch_delay: Duration,
    #[builder(default = "DELETE_BATCH_DELAY")]
    pub delete_batch_delay: Duration,
    #[builder(default = "DEFAULT_MAX_BRANCH_AGE_DAYS")]
    pub max_age_days: u64,
}

impl CleanupSettingsBuilder {
    pub fn build(&self) -> Result<CleanupSettings> {
        let settings = self._build().map_err(|e| {
            BuddyError::invalid_config(format!(
                "Failed to build cleanup settings: {}",
                e
            ))
        })?;

        if settings.batch_size == 0 {
            return Err(BuddyError::invalid_config(
                "cleanup batch size must be greater than zero",
            ));
        }

        Ok(settings)
    }
}

impl CleanupSettings {
    pub fn builder() -> CleanupSettingsBuilder {
        CleanupSettingsBuilder::default()
    }

    pub fn from_config(config: &CleanupConfig) -> Result<Self> {
        Self::builder().max_age_days(config.max_age_days).build()
    }
}

/// Protected branch names plus the commit times learned while deciding.
struct Detection {
    strategy: DetectionStrategy,
    protected: HashSet<String>,
    timestamps: HashMap<String, i64>,
}

pub struct BranchCleaner {
    forge: Rc<ForgeManager>,
    settings: CleanupSettings,
}

impl BranchCleaner {
    pub fn new(forge: Rc<ForgeManager>, settings: CleanupSettings) -> Self {
        Self { forge, settings }
    }

    pub async fn run(&self) -> Result<CleanupReport> {
        let prefix = format!("{BRANCH_PREFIX}/");
        let branches = self.forge.list_branches(&prefix).await?;

        info!("found {} branch(es) under {prefix}", branches.len());

        let open_heads = self.open_pr_heads().await;
        let detection = self.detect(&branches).await;

        info!("orphan detection used {:?}", detection.strategy);

        let mut protected = vec![];
        let mut orphans = vec![];

        for branch in branches.iter() {
            if open_heads.contains(&branch.name)
                || detection.protected.contains(&branch.name)
            {
                protected.push(branch.name.clone());
            } else {
                orphans.push(branch.name.clone());
            }
        }

        let (deletable, retained) =
            self.apply_age_cutoff(&detection, orphans);

        for name in retained.iter() {
            info!("keeping {name}: younger than the age cutoff");
        }

        let (deleted, failures) = self.delete_in_batches(&deletable).await;

        let report = CleanupReport {
            strategy: detection.strategy,
            scanned: branches.len(),
            protected,
            deleted,
            retained,
            failures,
        };

        info!(
            "cleanup finished: {} deleted, {} protected, {} retained, {} failed",
            report.deleted.len(),
            report.protected.len(),
            report.retained.len(),
            report.failures.len()
        );

        Ok(report)
    }

    /// Head branch names of open pull requests. A listing failure only
    /// weakens protection, detection still runs.
    async fn open_pr_heads(&self) -> HashSet<String> {
        match self.forge.list_open_pull_requests().await {
            Ok(prs) => prs.into_iter().map(|pr| pr.head_branch).collect(),
            Err(err) => {
                warn!("failed to list open pull requests: {err}");
                HashSet::new()
            }
        }
    }

    async fn detect(&self, branches: &[RemoteBranch]) -> Detection {
        match self.protect_by_pull_heads(branches).await {
            Ok(protected) => {
                return Detection {
                    strategy: DetectionStrategy::PullRequestHeads,
                    protected,
                    timestamps: HashMap::new(),
                };
            }
            Err(err) => {
                warn!("pull request head detection failed: {err}: falling back to recent commits");
            }
        }

        match self
            .protect_recent(branches, ChronoDuration::hours(RECENT_WINDOW_HOURS), false)
            .await
        {
            Ok((protected, timestamps)) => {
                return Detection {
                    strategy: DetectionStrategy::RecentCommits,
                    protected,
                    timestamps,
                };
            }
            Err(err) => {
                warn!("recent commit detection failed: {err}: widening the window");
            }
        }

        match self
            .protect_recent(branches, ChronoDuration::days(EXTENDED_WINDOW_DAYS), true)
            .await
        {
            Ok((protected, timestamps)) => Detection {
                strategy: DetectionStrategy::ExtendedRecentCommits,
                protected,
                timestamps,
            },
            Err(err) => {
                warn!("extended commit detection failed: {err}: protecting every branch");
                Detection {
                    strategy: DetectionStrategy::ProtectAll,
                    protected: branches.iter().map(|b| b.name.clone()).collect(),
                    timestamps: HashMap::new(),
                }
            }
        }
    }

    /// Protects every branch whose tip is the head of a pull request that is
    /// still open. A state lookup that fails counts as open.
    async fn protect_by_pull_heads(
        &self,
        branches: &[RemoteBranch],
    ) -> Result<HashSet<String>> {
        let heads = self.forge.list_pull_heads().await?;

        let mut by_sha: HashMap<&str, Vec<&str>> = HashMap::new();
        for branch in branches.iter() {
            by_sha
                .entry(branch.head_sha.as_str())
                .or_default()
                .push(branch.name.as_str());
        }

        let candidates = heads
            .into_iter()
            .filter(|h| by_sha.contains_key(h.sha.as_str()))
            .collect::<Vec<PullHead>>();

        debug!(
            "{} pull request head(s) point at managed branches",
            candidates.len()
        );

        let states = self.check_states(&candidates).await;

        if !states.is_empty() && states.iter().all(|(_, s)| s.is_err()) {
            return Err(BuddyError::forge(
                "every pull request state lookup failed",
            ));
        }

        let mut protected = HashSet::new();

        for (head, state) in states.into_iter() {
            let open = match state {
                Ok(state) => state == PrState::Open,
                Err(err) => {
                    warn!(
                        "state of PR #{} unknown: {err}: treating it as open",
                        head.number
                    );
                    true
                }
            };

            if open && let Some(names) = by_sha.get(head.sha.as_str()) {
                protected.extend(names.iter().map(|n| n.to_string()));
            }
        }

        Ok(protected)
    }

    /// Checks pull request states in throttled batches.
    async fn check_states(
        &self,
        heads: &[PullHead],
    ) -> Vec<(PullHead, Result<PrState>)> {
        let mut results = vec![];

        for (i, batch) in heads.chunks(self.settings.batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.state_check_batch_delay).await;
            }

            let lookups = batch.iter().map(|head| async move {
                let jitter = self.jitter();
                if !jitter.is_zero() {
                    tokio::time::sleep(jitter).await;
                }
                (head.clone(), self.forge.get_pr_state(head.number).await)
            });

            results.extend(join_all(lookups).await);
        }

        results
    }

    fn jitter(&self) -> Duration {
        let max = self.settings.state_check_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }

    /// Protects branches committed to within `window`. Unknown commit times
    /// fail the layer unless `fetch_missing` allows looking them up.
    async fn protect_recent(
        &self,
        branches: &[RemoteBranch],
        window: ChronoDuration,
        fetch_missing: bool,
    ) -> Result<(HashSet<String>, HashMap<String, i64>)> {
        let cutoff = Utc::now().timestamp() - window.num_seconds();
        let mut protected = HashSet::new();
        let mut timestamps = HashMap::new();

        for branch in branches.iter() {
            let timestamp = match branch.last_commit_timestamp {
                Some(ts) => ts,
                None if fetch_missing => self
                    .forge
                    .get_commit_timestamp(&branch.head_sha)
                    .await?
                    .ok_or_else(|| {
                        BuddyError::forge(format!(
                            "no commit time for {}",
                            branch.name
                        ))
                    })?,
                None => {
                    return Err(BuddyError::forge(format!(
                        "no commit time listed for {}",
                        branch.name
                    )));
                }
            };

            if timestamp >= cutoff {
                protected.insert(branch.name.clone());
            }

            timestamps.insert(branch.name.clone(), timestamp);
        }

        Ok((protected, timestamps))
    }

    /// Splits orphans into deletable and retained. Orphans are only retained
    /// after a fallback detection and only while younger than the cutoff.
    fn apply_age_cutoff(
        &self,
        detection: &Detection,
        orphans: Vec<String>,
    ) -> (Vec<String>, Vec<String>) {
        if detection.strategy.is_primary() {
            return (orphans, vec![]);
        }

        let cutoff = Utc::now().timestamp()
            - ChronoDuration::days(self.settings.max_age_days as i64)
                .num_seconds();

        orphans.into_iter().partition(|name| {
            detection
                .timestamps
                .get(name)
                .is_some_and(|ts| *ts < cutoff)
        })
    }

    async fn delete_in_batches(
        &self,
        branches: &[String],
    ) -> (Vec<String>, Vec<DeleteFailure>) {
        let mut deleted = vec![];
        let mut failures = vec![];

        for (i, batch) in branches.chunks(self.settings.batch_size).enumerate()
        {
            if i > 0 {
                tokio::time::sleep(self.settings.delete_batch_delay).await;
            }

            for branch in batch.iter() {
                match self.forge.delete_branch(branch).await {
                    Ok(()) => {
                        info!("deleted orphaned branch {branch}");
                        deleted.push(branch.clone());
                    }
                    Err(err) => {
                        warn!("failed to delete {branch}: {err}");
                        failures.push(DeleteFailure {
                            branch: branch.clone(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }

        (deleted, failures)
    }
}
