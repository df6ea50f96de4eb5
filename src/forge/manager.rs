//! Manager that wraps forge implementations
use async_trait::async_trait;
use log::*;
use std::future::Future;

pub use crate::retry::RetryPolicy;

use crate::{
    Result,
    file_loader::FileLoader,
    forge::{
        config::RemoteConfig,
        request::{
            Commit, CreateBranchRequest, CreateCommitRequest,
            CreateIssueRequest, CreatePrRequest, GetFileContentRequest, Issue,
            ListIssuesRequest, PrAssigneesRequest, PrLabelsRequest,
            PrReviewersRequest, PrState, PullHead, PullRequestRecord,
            RemoteBranch, UpdateIssueRequest, UpdatePrRequest,
        },
        traits::Forge,
    },
};

pub struct ForgeManager {
    forge: Box<dyn Forge>,
    remote_config: RemoteConfig,
    retry: RetryPolicy,
}

impl ForgeManager {
    pub fn new(forge: Box<dyn Forge>) -> Self {
        let remote_config = forge.remote_config();
        Self {
            forge,
            remote_config,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn remote_config(&self) -> RemoteConfig {
        self.remote_config.clone()
    }

    pub fn dry_run(&self) -> bool {
        self.remote_config.dry_run
    }

    pub fn default_branch(&self) -> String {
        self.forge.default_branch()
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry.run(operation, f).await
    }

    /// Open pull request whose head is `branch`, if the forge can tell.
    async fn find_open_pr_for_head(
        &self,
        branch: &str,
    ) -> Option<PullRequestRecord> {
        match self.forge.list_open_pull_requests().await {
            Ok(prs) => prs.into_iter().find(|pr| pr.head_branch == branch),
            Err(err) => {
                warn!("failed to check for an existing PR on {branch}: {err}");
                None
            }
        }
    }

    pub async fn get_file_content(
        &self,
        req: GetFileContentRequest,
    ) -> Result<Option<String>> {
        self.with_retry("get_file_content", || {
            self.forge.get_file_content(req.clone())
        })
        .await
    }

    pub async fn get_branch(&self, branch: &str) -> Result<Option<RemoteBranch>> {
        self.with_retry("get_branch", || self.forge.get_branch(branch))
            .await
    }

    pub async fn list_branches(
        &self,
        prefix: &str,
    ) -> Result<Vec<RemoteBranch>> {
        debug!("listing branches under {prefix}");
        self.with_retry("list_branches", || self.forge.list_branches(prefix))
            .await
    }

    pub async fn get_commit_timestamp(&self, sha: &str) -> Result<Option<i64>> {
        self.with_retry("get_commit_timestamp", || {
            self.forge.get_commit_timestamp(sha)
        })
        .await
    }

    pub async fn list_open_pull_requests(
        &self,
    ) -> Result<Vec<PullRequestRecord>> {
        self.with_retry("list_open_pull_requests", || {
            self.forge.list_open_pull_requests()
        })
        .await
    }

    pub async fn list_pull_heads(&self) -> Result<Vec<PullHead>> {
        self.with_retry("list_pull_heads", || self.forge.list_pull_heads())
            .await
    }

    pub async fn get_pr_state(&self, pr_number: u64) -> Result<PrState> {
        self.with_retry("get_pr_state", || self.forge.get_pr_state(pr_number))
            .await
    }

    pub async fn list_issues(&self, req: ListIssuesRequest) -> Result<Vec<Issue>> {
        self.with_retry("list_issues", || self.forge.list_issues(req.clone()))
            .await
    }

    pub async fn create_branch(
        &self,
        req: CreateBranchRequest,
    ) -> Result<RemoteBranch> {
        if self.dry_run() {
            warn!("dry_run: would create branch: req: {:#?}", req);
            return Ok(RemoteBranch {
                name: req.branch,
                head_sha: "fff".into(),
                last_commit_timestamp: None,
            });
        }
        self.with_retry("create_branch", || {
            self.forge.create_branch(req.clone())
        })
        .await
    }

    pub async fn delete_branch(&self, branch: &str) -> Result<()> {
        if self.dry_run() {
            warn!("dry_run: would delete branch: {branch}");
            return Ok(());
        }
        self.with_retry("delete_branch", || self.forge.delete_branch(branch))
            .await
    }

    pub async fn create_commit(
        &self,
        req: CreateCommitRequest,
    ) -> Result<Option<Commit>> {
        if self.dry_run() {
            warn!("dry_run: would create commit: req: {:#?}", req);
            return Ok(Some(Commit { sha: "fff".into() }));
        }
        self.with_retry("create_commit", || {
            self.forge.create_commit(req.clone())
        })
        .await
    }

    pub async fn create_pr(
        &self,
        req: CreatePrRequest,
    ) -> Result<PullRequestRecord> {
        if self.dry_run() {
            warn!("dry_run: would create PR: req: {:#?}", req);
            return Ok(PullRequestRecord {
                number: 0,
                title: req.title,
                head_branch: req.head_branch,
                head_sha: "fff".into(),
                base_branch: req.base_branch,
                state: PrState::Open,
                body: req.body,
                labels: vec![],
                author: "".into(),
            });
        }

        // a lost response can hide a PR that was already created, so look
        // for it before every retry
        let mut attempt = 0;

        loop {
            let err = match self.forge.create_pr(req.clone()).await {
                Err(err) => err,
                ok => return ok,
            };

            if !self.retry.backoff("create_pr", &err, attempt).await {
                return Err(err);
            }

            attempt += 1;

            if let Some(existing) =
                self.find_open_pr_for_head(&req.head_branch).await
            {
                info!(
                    "PR #{} for {} already exists: not creating another",
                    existing.number, req.head_branch
                );
                return Ok(existing);
            }
        }
    }

    pub async fn update_pr(&self, req: UpdatePrRequest) -> Result<()> {
        if self.dry_run() {
            warn!("dry_run: would update PR: req: {:#?}", req);
            return Ok(());
        }
        self.with_retry("update_pr", || self.forge.update_pr(req.clone()))
            .await
    }

    pub async fn close_pr(&self, pr_number: u64) -> Result<()> {
        if self.dry_run() {
            warn!("dry_run: would close PR #{pr_number}");
            return Ok(());
        }
        self.with_retry("close_pr", || self.forge.close_pr(pr_number))
            .await
    }

    pub async fn comment_on_pr(&self, pr_number: u64, body: &str) -> Result<()> {
        if self.dry_run() {
            warn!("dry_run: would comment on PR #{pr_number}: {body}");
            return Ok(());
        }
        self.with_retry("comment_on_pr", || {
            self.forge.comment_on_pr(pr_number, body)
        })
        .await
    }

    pub async fn add_pr_labels(&self, req: PrLabelsRequest) -> Result<()> {
        if req.labels.is_empty() {
            return Ok(());
        }
        if self.dry_run() {
            warn!("dry_run: would add PR labels: req: {:#?}", req);
            return Ok(());
        }
        self.with_retry("add_pr_labels", || {
            self.forge.add_pr_labels(req.clone())
        })
        .await
    }

    pub async fn add_pr_reviewers(&self, req: PrReviewersRequest) -> Result<()> {
        if req.reviewers.is_empty() {
            return Ok(());
        }
        if self.dry_run() {
            warn!("dry_run: would request PR reviewers: req: {:#?}", req);
            return Ok(());
        }
        self.with_retry("add_pr_reviewers", || {
            self.forge.add_pr_reviewers(req.clone())
        })
        .await
    }

    pub async fn add_pr_assignees(&self, req: PrAssigneesRequest) -> Result<()> {
        if req.assignees.is_empty() {
            return Ok(());
        }
        if self.dry_run() {
            warn!("dry_run: would add PR assignees: req: {:#?}", req);
            return Ok(());
        }
        self.with_retry("add_pr_assignees", || {
            self.forge.add_pr_assignees(req.clone())
        })
        .await
    }

    pub async fn create_issue(&self, req: CreateIssueRequest) -> Result<Issue> {
        if self.dry_run() {
            warn!("dry_run: would create issue: req: {:#?}", req);
            return Ok(Issue {
                number: 0,
                title: req.title,
                body: req.body,
                labels: req.labels,
                open: true,
            });
        }
        self.with_retry("create_issue", || self.forge.create_issue(req.clone()))
            .await
    }

    pub async fn update_issue(&self, req: UpdateIssueRequest) -> Result<()> {
        if self.dry_run() {
            warn!("dry_run: would update issue: req: {:#?}", req);
            return Ok(());
        }
        self.with_retry("update_issue", || self.forge.update_issue(req.clone()))
            .await
    }

    pub async fn close_issue(&self, issue_number: u64) -> Result<()> {
        if self.dry_run() {
            warn!("dry_run: would close issue #{issue_number}");
            return Ok(());
        }
        self.with_retry("close_issue", || self.forge.close_issue(issue_number))
            .await
    }
}

#[async_trait]
impl FileLoader for ForgeManager {
    async fn load_file(
        &self,
        branch: Option<String>,
        path: String,
    ) -> Result<Option<String>> {
        self.get_file_content(GetFileContentRequest { branch, path })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BuddyError, forge::traits::MockForge, test_helpers::pr_record};
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };

    fn no_delay() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::ZERO,
        }
    }

    fn dry_run_forge() -> MockForge {
        let mut mock_forge = MockForge::new();
        mock_forge.expect_remote_config().returning(|| RemoteConfig {
            dry_run: true,
            ..Default::default()
        });
        mock_forge
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut mock_forge = MockForge::new();
        mock_forge
            .expect_remote_config()
            .returning(RemoteConfig::default);
        mock_forge.expect_list_open_pull_requests().returning(move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(BuddyError::RateLimitExceeded)
            } else {
                Ok(vec![])
            }
        });

        let manager =
            ForgeManager::new(Box::new(mock_forge)).with_retry_policy(no_delay());

        let result = manager.list_open_pull_requests().await.unwrap();

        assert!(result.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let mut mock_forge = MockForge::new();
        mock_forge
            .expect_remote_config()
            .returning(RemoteConfig::default);
        mock_forge
            .expect_list_pull_heads()
            .times(4)
            .returning(|| Err(BuddyError::NetworkError("reset".into())));

        let manager =
            ForgeManager::new(Box::new(mock_forge)).with_retry_policy(no_delay());

        let err = manager.list_pull_heads().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let mut mock_forge = MockForge::new();
        mock_forge
            .expect_remote_config()
            .returning(RemoteConfig::default);
        mock_forge
            .expect_get_pr_state()
            .times(1)
            .returning(|_| Err(BuddyError::forge("not found")));

        let manager =
            ForgeManager::new(Box::new(mock_forge)).with_retry_policy(no_delay());

        assert!(manager.get_pr_state(7).await.is_err());
    }

    fn pr_request(head_branch: &str) -> CreatePrRequest {
        CreatePrRequest {
            title: "chore(deps): update lodash".into(),
            body: "body".into(),
            head_branch: head_branch.into(),
            base_branch: "main".into(),
        }
    }

    #[tokio::test]
    async fn create_pr_retry_reuses_pr_created_by_lost_request() {
        let branch = "buddy-bot/update-lodash-1";

        let mut mock_forge = MockForge::new();
        mock_forge
            .expect_remote_config()
            .returning(RemoteConfig::default);
        mock_forge
            .expect_create_pr()
            .times(1)
            .returning(|_| Err(BuddyError::NetworkError("reset".into())));
        mock_forge
            .expect_list_open_pull_requests()
            .times(1)
            .returning(move || {
                Ok(vec![pr_record(12, "chore(deps): update lodash", branch)])
            });

        let manager =
            ForgeManager::new(Box::new(mock_forge)).with_retry_policy(no_delay());

        let pr = manager.create_pr(pr_request(branch)).await.unwrap();

        assert_eq!(pr.number, 12);
    }

    #[tokio::test]
    async fn create_pr_retries_when_no_pr_exists_yet() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut mock_forge = MockForge::new();
        mock_forge
            .expect_remote_config()
            .returning(RemoteConfig::default);
        mock_forge.expect_create_pr().returning(move |req| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(BuddyError::RateLimitExceeded);
            }
            Ok(pr_record(13, &req.title, &req.head_branch))
        });
        mock_forge
            .expect_list_open_pull_requests()
            .times(1)
            .returning(|| Ok(vec![]));

        let manager =
            ForgeManager::new(Box::new(mock_forge)).with_retry_policy(no_delay());

        let pr = manager
            .create_pr(pr_request("buddy-bot/update-lodash-2"))
            .await
            .unwrap();

        assert_eq!(pr.number, 13);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dry_run_prevents_create_pr() {
        let manager = ForgeManager::new(Box::new(dry_run_forge()));
        let req = CreatePrRequest {
            title: "test".to_string(),
            body: "test body".to_string(),
            head_branch: "branch".to_string(),
            base_branch: "main".to_string(),
        };
        let result = manager.create_pr(req).await.unwrap();

        assert_eq!(result.number, 0);
        assert_eq!(result.head_sha, "fff");
    }

    #[tokio::test]
    async fn dry_run_prevents_branch_writes() {
        let manager = ForgeManager::new(Box::new(dry_run_forge()));

        assert!(manager.delete_branch("buddy-bot/update-x-1").await.is_ok());

        let commit = manager
            .create_commit(CreateCommitRequest {
                branch: "buddy-bot/update-x-1".into(),
                message: "chore(deps): update".into(),
                file_changes: vec![],
                allow_empty: false,
            })
            .await
            .unwrap();
        assert_eq!(commit, Some(Commit { sha: "fff".into() }));
    }

    #[tokio::test]
    async fn dry_run_prevents_pr_mutations() {
        let manager = ForgeManager::new(Box::new(dry_run_forge()));

        assert!(manager.close_pr(42).await.is_ok());
        assert!(manager.comment_on_pr(42, "closing").await.is_ok());
        assert!(
            manager
                .update_pr(UpdatePrRequest {
                    pr_number: 42,
                    title: "Updated title".to_string(),
                    body: "Updated body".to_string(),
                })
                .await
                .is_ok()
        );
        assert!(
            manager
                .add_pr_labels(PrLabelsRequest {
                    pr_number: 42,
                    labels: vec!["dependencies".to_string()],
                })
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn empty_reviewer_lists_skip_the_call() {
        let mut mock_forge = MockForge::new();
        mock_forge
            .expect_remote_config()
            .returning(RemoteConfig::default);
        mock_forge.expect_add_pr_reviewers().never();

        let manager = ForgeManager::new(Box::new(mock_forge));
        manager
            .add_pr_reviewers(PrReviewersRequest {
                pr_number: 1,
                reviewers: vec![],
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn loads_files_through_the_forge() {
        let mut mock_forge = MockForge::new();
        mock_forge
            .expect_remote_config()
            .returning(RemoteConfig::default);
        mock_forge
            .expect_get_file_content()
            .with(mockall::predicate::eq(GetFileContentRequest {
                branch: Some("main".to_string()),
                path: "package.json".to_string(),
            }))
            .returning(|_| Ok(Some(r#"{"version":"1.0.0"}"#.to_string())));

        let manager = ForgeManager::new(Box::new(mock_forge));
        let content = manager
            .load_file(Some("main".into()), "package.json".into())
            .await
            .unwrap();

        assert!(content.unwrap().contains("1.0.0"));
    }
}
