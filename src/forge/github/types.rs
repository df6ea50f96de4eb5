use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::forge::request::{Issue, PrState, PullRequestRecord};

pub const TREE_BLOB_MODE: &str = "100644";
pub const TREE_BLOB_TYPE: &str = "blob";

pub const LIST_REFS_QUERY: &str = r#"
query ListRefs($owner: String!, $repo: String!, $prefix: String!, $cursor: String) {
  repository(owner: $owner, name: $repo) {
    refs(refPrefix: $prefix, first: 100, after: $cursor) {
      pageInfo {
        hasNextPage
        endCursor
      }
      nodes {
        name
        target {
          oid
          ... on Commit {
            committedDate
          }
        }
      }
    }
  }
}"#;

pub const SHA_DATE_QUERY: &str = r#"
query GetShaDate($owner: String!, $repo: String!, $sha: GitObjectID!) {
  repository(owner: $owner, name: $repo) {
    startCommit: object(oid: $sha) {
      ... on Commit {
        committedDate
      }
    }
  }
}"#;

#[derive(Debug, Serialize)]
pub struct GithubTreeEntry {
    pub path: String,
    pub mode: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct GithubTree {
    pub base_tree: String,
    pub tree: Vec<GithubTreeEntry>,
}

#[derive(Debug, Deserialize)]
pub struct Tree {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub struct GitCommit {
    pub sha: String,
    pub tree: Tree,
}

#[derive(Debug, Deserialize)]
pub struct GithubUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct GithubLabel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct GithubPullRef {
    #[serde(rename = "ref")]
    pub ref_field: String,
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub struct GithubPullRequest {
    pub number: u64,
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: Option<String>,
    pub merged_at: Option<String>,
    pub head: GithubPullRef,
    pub base: GithubPullRef,
    #[serde(default)]
    pub labels: Vec<GithubLabel>,
    pub user: Option<GithubUser>,
}

impl GithubPullRequest {
    pub fn pr_state(&self) -> PrState {
        match (self.state.as_deref(), &self.merged_at) {
            (Some("open"), _) => PrState::Open,
            (_, Some(_)) => PrState::Merged,
            _ => PrState::Closed,
        }
    }
}

impl From<GithubPullRequest> for PullRequestRecord {
    fn from(pr: GithubPullRequest) -> Self {
        let state = pr.pr_state();
        Self {
            number: pr.number,
            title: pr.title.unwrap_or_default(),
            head_branch: pr.head.ref_field,
            head_sha: pr.head.sha,
            base_branch: pr.base.ref_field,
            state,
            body: pr.body.unwrap_or_default(),
            labels: pr.labels.into_iter().map(|l| l.name).collect(),
            author: pr.user.map(|u| u.login).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GithubIssue {
    pub number: u64,
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: Option<String>,
    #[serde(default)]
    pub labels: Vec<GithubLabel>,
    /// Present when the issue is actually a pull request
    pub pull_request: Option<serde_json::Value>,
}

impl From<GithubIssue> for Issue {
    fn from(issue: GithubIssue) -> Self {
        Self {
            number: issue.number,
            title: issue.title.unwrap_or_default(),
            body: issue.body.unwrap_or_default(),
            labels: issue.labels.into_iter().map(|l| l.name).collect(),
            open: issue.state.as_deref() == Some("open"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefTarget {
    pub oid: String,
    #[serde(rename = "committedDate")]
    pub committed_date: Option<String>,
}

impl RefTarget {
    pub fn timestamp(&self) -> Option<i64> {
        self.committed_date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.timestamp())
    }
}

#[derive(Debug, Deserialize)]
pub struct RefNode {
    pub name: String,
    pub target: Option<RefTarget>,
}

#[derive(Debug, Deserialize)]
pub struct QueryPageInfo {
    #[serde(rename = "hasNextPage")]
    pub has_next_page: bool,
    #[serde(rename = "endCursor")]
    pub end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefsConnection {
    pub nodes: Vec<RefNode>,
    #[serde(rename = "pageInfo")]
    pub page_info: QueryPageInfo,
}

#[derive(Debug, Deserialize)]
pub struct RefsRepository {
    pub refs: Option<RefsConnection>,
}

#[derive(Debug, Deserialize)]
pub struct RefsData {
    pub repository: Option<RefsRepository>,
}

#[derive(Debug, Deserialize)]
pub struct RefsResult {
    pub data: Option<RefsData>,
}

#[derive(Debug, Serialize)]
pub struct RefsQueryVariables {
    pub owner: String,
    pub repo: String,
    pub prefix: String,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartCommit {
    #[serde(rename = "committedDate")]
    pub committed_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartCommitRepo {
    #[serde(rename = "startCommit")]
    pub start_commit: Option<StartCommit>,
}

#[derive(Debug, Deserialize)]
pub struct StartCommitData {
    pub repository: Option<StartCommitRepo>,
}

#[derive(Debug, Deserialize)]
pub struct StartCommitResult {
    pub data: Option<StartCommitData>,
}

#[derive(Debug, Serialize)]
pub struct ShaDateQueryVariables {
    pub owner: String,
    pub repo: String,
    pub sha: String,
}
