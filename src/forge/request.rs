use serde::{Deserialize, Serialize};

/// A branch on the remote as observed at list time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBranch {
    pub name: String,
    pub head_sha: String,
    /// Unix seconds of the tip commit, when the listing provided it
    pub last_commit_timestamp: Option<i64>,
}

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

/// Pull request as seen by the sync engine. Fields the engine does not
/// need are not carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestRecord {
    pub number: u64,
    pub title: String,
    pub head_branch: String,
    pub head_sha: String,
    pub base_branch: String,
    pub state: PrState,
    pub body: String,
    pub labels: Vec<String>,
    pub author: String,
}

/// A `refs/pull/<number>/head` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullHead {
    pub number: u64,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetFileContentRequest {
    pub branch: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    /// Relative path to the file starting from repo root
    pub path: String,
    /// Full replacement content of the file
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBranchRequest {
    pub branch: String,
    pub base_branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCommitRequest {
    pub branch: String,
    pub message: String,
    pub file_changes: Vec<FileChange>,
    /// Commit even when the resulting tree equals the parent tree
    pub allow_empty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Commit {
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePrRequest {
    pub head_branch: String,
    pub base_branch: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePrRequest {
    pub pr_number: u64,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrLabelsRequest {
    pub pr_number: u64,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrReviewersRequest {
    pub pr_number: u64,
    pub reviewers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrAssigneesRequest {
    pub pr_number: u64,
    pub assignees: Vec<String>,
}

/// Tracking issue used by dashboard style collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIssueRequest {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListIssuesRequest {
    pub labels: Vec<String>,
    pub include_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateIssueRequest {
    pub issue_number: u64,
    pub title: Option<String>,
    pub body: Option<String>,
}
