//! Traits related to remote git forges
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::{
    Result,
    forge::{
        config::RemoteConfig,
        request::{
            Commit, CreateBranchRequest, CreateCommitRequest,
            CreateIssueRequest, CreatePrRequest, GetFileContentRequest, Issue,
            ListIssuesRequest, PrAssigneesRequest, PrLabelsRequest,
            PrReviewersRequest, PrState, PullHead, PullRequestRecord,
            RemoteBranch, UpdateIssueRequest, UpdatePrRequest,
        },
    },
};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Forge: Send + Sync {
    fn remote_config(&self) -> RemoteConfig;
    fn default_branch(&self) -> String;

    async fn get_file_content(
        &self,
        req: GetFileContentRequest,
    ) -> Result<Option<String>>;

    async fn get_branch(&self, branch: &str) -> Result<Option<RemoteBranch>>;
    /// Every branch under `prefix` (which must end with `/`) with its tip
    /// SHA and commit time, in one bulk listing.
    async fn list_branches(&self, prefix: &str) -> Result<Vec<RemoteBranch>>;
    async fn create_branch(
        &self,
        req: CreateBranchRequest,
    ) -> Result<RemoteBranch>;
    async fn delete_branch(&self, branch: &str) -> Result<()>;
    async fn get_commit_timestamp(&self, sha: &str) -> Result<Option<i64>>;

    /// Commits through the blob/tree/commit API. Returns `None` when the
    /// resulting tree equals the parent tree and the request does not allow
    /// empty commits.
    async fn create_commit(
        &self,
        req: CreateCommitRequest,
    ) -> Result<Option<Commit>>;

    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequestRecord>>;
    /// Read-only listing of `refs/pull/<n>/head` references.
    async fn list_pull_heads(&self) -> Result<Vec<PullHead>>;
    async fn get_pr_state(&self, pr_number: u64) -> Result<PrState>;
    async fn create_pr(&self, req: CreatePrRequest)
    -> Result<PullRequestRecord>;
    async fn update_pr(&self, req: UpdatePrRequest) -> Result<()>;
    async fn close_pr(&self, pr_number: u64) -> Result<()>;
    async fn comment_on_pr(&self, pr_number: u64, body: &str) -> Result<()>;
    async fn add_pr_labels(&self, req: PrLabelsRequest) -> Result<()>;
    async fn add_pr_reviewers(&self, req: PrReviewersRequest) -> Result<()>;
    async fn add_pr_assignees(&self, req: PrAssigneesRequest) -> Result<()>;

    async fn create_issue(&self, req: CreateIssueRequest) -> Result<Issue>;
    async fn list_issues(&self, req: ListIssuesRequest) -> Result<Vec<Issue>>;
    async fn update_issue(&self, req: UpdateIssueRequest) -> Result<()>;
    async fn close_issue(&self, issue_number: u64) -> Result<()>;
}
