//! Implements the Forge trait for Github
use async_trait::async_trait;
use log::*;
use octocrab::{
    Octocrab,
    models::repos::Object,
    params::{self, repos::Reference},
};
use regex::Regex;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use std::sync::LazyLock;

use crate::{
    BuddyError, Result,
    forge::{
        config::{DEFAULT_LABEL_COLOR, DEFAULT_PAGE_SIZE, RemoteConfig},
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

pub mod types;

use types::{
    GitCommit, GithubIssue, GithubLabel, GithubPullRequest, GithubTree,
    GithubTreeEntry, LIST_REFS_QUERY, RefsQueryVariables, RefsResult,
    SHA_DATE_QUERY, ShaDateQueryVariables, StartCommitResult, TREE_BLOB_MODE,
    TREE_BLOB_TYPE, Tree,
};

static PULL_HEAD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^refs/pull/(?<number>\d+)/head$").unwrap()
});

fn is_not_found(err: &octocrab::Error) -> bool {
    matches!(
        err,
        octocrab::Error::GitHub { source, .. }
            if source.status_code == StatusCode::NOT_FOUND
    )
}

/// GitHub forge implementation using Octocrab for API interactions with
/// branches, commits, pull requests and issues.
pub struct Github {
    config: RemoteConfig,
    base_uri: String,
    instance: Octocrab,
    default_branch: String,
}

impl Github {
    /// Create GitHub client with personal access token authentication and API
    /// base URL configuration.
    pub async fn new(config: RemoteConfig) -> Result<Self> {
        let mut github = Self::connect(config, String::new())?;

        let repo = github
            .instance
            .repos(&github.config.owner, &github.config.repo)
            .get()
            .await?;

        github.default_branch = repo.default_branch.ok_or_else(|| {
            BuddyError::forge(format!(
                "failed to find default branch for github repo: {}",
                github.config.path
            ))
        })?;

        Ok(github)
    }

    fn connect(config: RemoteConfig, default_branch: String) -> Result<Self> {
        let base_uri = config.api_base_uri();
        let builder = Octocrab::builder()
            .personal_token(config.token.clone())
            .base_uri(base_uri.clone())?;
        let instance = builder.build()?;

        Ok(Self {
            config,
            base_uri,
            instance,
            default_branch,
        })
    }

    fn repo_endpoint(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{path}",
            self.base_uri, self.config.owner, self.config.repo
        )
    }

    async fn create_tree(&self, tree: GithubTree) -> Result<Tree> {
        let endpoint = self.repo_endpoint("git/trees");

        let body = serde_json::json!(tree);

        info!("creating tree starting from: {}", tree.base_tree);

        let tree: Tree = self.instance.post(endpoint, Some(&body)).await?;

        info!("created new tree: {}", tree.sha);

        Ok(tree)
    }

    async fn create_git_commit(
        &self,
        message: &str,
        parent_sha: &str,
        tree_sha: &str,
    ) -> Result<Commit> {
        let endpoint = self.repo_endpoint("git/commits");

        let body = serde_json::json!({
          "message": message.to_string(),
          "tree": tree_sha.to_string(),
          "parents": vec![parent_sha.to_string()],
        });

        let commit: Commit = self.instance.post(endpoint, Some(&body)).await?;

        Ok(commit)
    }

    async fn list_labels(&self) -> Result<Vec<GithubLabel>> {
        let mut labels = vec![];
        let mut page = 1;

        loop {
            let found: Vec<GithubLabel> = self
                .instance
                .get(
                    self.repo_endpoint(&format!(
                        "labels?per_page={DEFAULT_PAGE_SIZE}&page={page}"
                    )),
                    None::<&()>,
                )
                .await?;

            let count = found.len();
            labels.extend(found);

            if count < DEFAULT_PAGE_SIZE as usize {
                break;
            }

            page += 1;
        }

        Ok(labels)
    }

    async fn ensure_labels(&self, names: &[String]) -> Result<Vec<String>> {
        let existing = self.list_labels().await?;

        let mut labels = vec![];

        for name in names.iter() {
            if existing.iter().any(|l| &l.name == name) {
                labels.push(name.clone());
                continue;
            }

            info!("creating missing label: {name}");

            let created: GithubLabel = self
                .instance
                .post(
                    self.repo_endpoint("labels"),
                    Some(&serde_json::json!({
                        "name": name,
                        "color": DEFAULT_LABEL_COLOR,
                    })),
                )
                .await?;

            labels.push(created.name);
        }

        Ok(labels)
    }
}

#[async_trait]
impl Forge for Github {
    fn remote_config(&self) -> RemoteConfig {
        self.config.clone()
    }

    fn default_branch(&self) -> String {
        self.default_branch.clone()
    }

    async fn get_file_content(
        &self,
        req: GetFileContentRequest,
    ) -> Result<Option<String>> {
        let handler = self.instance.repos(&self.config.owner, &self.config.repo);
        let mut builder = handler.get_content().path(&req.path);

        if let Some(branch) = req.branch.as_ref() {
            builder = builder.r#ref(branch);
        }

        match builder.send().await {
            Err(err) if is_not_found(&err) => {
                info!("no file found for path: {}", req.path);
                Ok(None)
            }
            Err(err) => {
                error!("error getting contents for path {}: {err}", req.path);
                Err(err.into())
            }
            Ok(mut data) => {
                let items = data.take_items();

                if items.is_empty() {
                    info!("no file found for path: {}", req.path);
                    return Ok(None);
                }

                items[0].decoded_content().map(Some).ok_or_else(|| {
                    BuddyError::forge(format!(
                        "failed to decode file content for path: {}",
                        req.path
                    ))
                })
            }
        }
    }

    async fn get_branch(&self, branch: &str) -> Result<Option<RemoteBranch>> {
        let result = self
            .instance
            .repos(&self.config.owner, &self.config.repo)
            .get_ref(&Reference::Branch(branch.to_string()))
            .await;

        match result {
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err.into()),
            Ok(found) => match found.object {
                Object::Commit { sha, .. } => Ok(Some(RemoteBranch {
                    name: branch.to_string(),
                    head_sha: sha,
                    last_commit_timestamp: None,
                })),
                _ => Err(BuddyError::forge(format!(
                    "ref {branch} does not point at a commit"
                ))),
            },
        }
    }

    async fn list_branches(&self, prefix: &str) -> Result<Vec<RemoteBranch>> {
        let mut branches = vec![];
        let mut cursor = None;

        loop {
            let vars = RefsQueryVariables {
                owner: self.config.owner.clone(),
                repo: self.config.repo.clone(),
                prefix: format!("refs/heads/{prefix}"),
                cursor: cursor.clone(),
            };

            let result: RefsResult = self
                .instance
                .graphql(&serde_json::json!({
                    "query": LIST_REFS_QUERY,
                    "variables": vars,
                }))
                .await?;

            let Some(refs) = result
                .data
                .and_then(|d| d.repository)
                .and_then(|r| r.refs)
            else {
                return Err(BuddyError::forge(format!(
                    "failed to list branches under {prefix}"
                )));
            };

            for node in refs.nodes.into_iter() {
                let Some(target) = node.target else {
                    continue;
                };

                branches.push(RemoteBranch {
                    name: format!("{prefix}{}", node.name),
                    last_commit_timestamp: target.timestamp(),
                    head_sha: target.oid,
                });
            }

            if !refs.page_info.has_next_page {
                break;
            }

            cursor = refs.page_info.end_cursor;
        }

        debug!("found {} branches under {prefix}", branches.len());

        Ok(branches)
    }

    async fn create_branch(
        &self,
        req: CreateBranchRequest,
    ) -> Result<RemoteBranch> {
        let base = self.get_branch(&req.base_branch).await?.ok_or_else(|| {
            BuddyError::forge(format!(
                "base branch not found: {}",
                req.base_branch
            ))
        })?;

        info!("creating branch {} from {}", req.branch, base.head_sha);

        self.instance
            .repos(&self.config.owner, &self.config.repo)
            .create_ref(&Reference::Branch(req.branch.clone()), base.head_sha.clone())
            .await?;

        Ok(RemoteBranch {
            name: req.branch,
            head_sha: base.head_sha,
            last_commit_timestamp: None,
        })
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        info!("deleting branch: {branch}");

        self.instance
            .repos(&self.config.owner, &self.config.repo)
            .delete_ref(&Reference::Branch(branch.to_string()))
            .await?;

        Ok(())
    }

    async fn get_commit_timestamp(&self, sha: &str) -> Result<Option<i64>> {
        let vars = ShaDateQueryVariables {
            owner: self.config.owner.clone(),
            repo: self.config.repo.clone(),
            sha: sha.to_string(),
        };

        let result: StartCommitResult = self
            .instance
            .graphql(&serde_json::json!({
              "query": SHA_DATE_QUERY,
              "variables": vars,
            }))
            .await?;

        let timestamp = result
            .data
            .and_then(|d| d.repository)
            .and_then(|r| r.start_commit)
            .and_then(|c| c.committed_date)
            .and_then(|d| chrono::DateTime::parse_from_rfc3339(&d).ok())
            .map(|d| d.timestamp());

        Ok(timestamp)
    }

    async fn create_commit(
        &self,
        req: CreateCommitRequest,
    ) -> Result<Option<Commit>> {
        let branch = self.get_branch(&req.branch).await?.ok_or_else(|| {
            BuddyError::forge(format!("branch not found: {}", req.branch))
        })?;

        let parent: GitCommit = self
            .instance
            .get(
                self.repo_endpoint(&format!("git/commits/{}", branch.head_sha)),
                None::<&()>,
            )
            .await?;

        let tree_sha = if req.file_changes.is_empty() {
            parent.tree.sha.clone()
        } else {
            let entries = req
                .file_changes
                .iter()
                .map(|change| GithubTreeEntry {
                    path: change
                        .path
                        .strip_prefix("./")
                        .unwrap_or(&change.path)
                        .to_string(),
                    mode: TREE_BLOB_MODE.into(),
                    kind: TREE_BLOB_TYPE.into(),
                    content: change.content.clone(),
                })
                .collect::<Vec<GithubTreeEntry>>();

            self.create_tree(GithubTree {
                base_tree: parent.tree.sha.clone(),
                tree: entries,
            })
            .await?
            .sha
        };

        if tree_sha == parent.tree.sha && !req.allow_empty {
            info!(
                "tree for {} is unchanged from parent {}: nothing to commit",
                req.branch, parent.sha
            );
            return Ok(None);
        }

        let commit = self
            .create_git_commit(&req.message, &parent.sha, &tree_sha)
            .await?;

        let _: serde_json::Value = self
            .instance
            .patch(
                self.repo_endpoint(&format!("git/refs/heads/{}", req.branch)),
                Some(&serde_json::json!({
                  "sha": commit.sha,
                  "force": false
                })),
            )
            .await?;

        info!("created commit {} on {}", commit.sha, req.branch);

        Ok(Some(commit))
    }

    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequestRecord>> {
        let mut records = vec![];
        let mut page = 1;

        loop {
            let prs: Vec<GithubPullRequest> = self
                .instance
                .get(
                    self.repo_endpoint(&format!(
                        "pulls?state=open&per_page={DEFAULT_PAGE_SIZE}&page={page}"
                    )),
                    None::<&()>,
                )
                .await?;

            let count = prs.len();
            records.extend(prs.into_iter().map(PullRequestRecord::from));

            if count < DEFAULT_PAGE_SIZE as usize {
                break;
            }

            page += 1;
        }

        debug!("found {} open pull requests", records.len());

        Ok(records)
    }

    async fn list_pull_heads(&self) -> Result<Vec<PullHead>> {
        let url = self.config.clone_url();
        let token = self.config.token.expose_secret().to_string();

        let heads = tokio::task::spawn_blocking(move || -> Result<Vec<PullHead>> {
            let mut callbacks = git2::RemoteCallbacks::new();
            callbacks.credentials(move |_url, _username, _allowed| {
                git2::Cred::userpass_plaintext("x-access-token", &token)
            });

            let mut remote = git2::Remote::create_detached(url.as_str())?;
            let connection = remote.connect_auth(
                git2::Direction::Fetch,
                Some(callbacks),
                None,
            )?;

            let heads = connection
                .list()?
                .iter()
                .filter_map(|head| {
                    let captures = PULL_HEAD_REGEX.captures(head.name())?;
                    let number = captures["number"].parse::<u64>().ok()?;
                    Some(PullHead {
                        number,
                        sha: head.oid().to_string(),
                    })
                })
                .collect::<Vec<PullHead>>();

            Ok(heads)
        })
        .await
        .map_err(|err| BuddyError::forge(format!("ls-remote task failed: {err}")))??;

        debug!("found {} pull head refs", heads.len());

        Ok(heads)
    }

    async fn get_pr_state(&self, pr_number: u64) -> Result<PrState> {
        let pr: GithubPullRequest = self
            .instance
            .get(self.repo_endpoint(&format!("pulls/{pr_number}")), None::<&()>)
            .await?;

        Ok(pr.pr_state())
    }

    async fn create_pr(
        &self,
        req: CreatePrRequest,
    ) -> Result<PullRequestRecord> {
        let pr: GithubPullRequest = self
            .instance
            .post(
                self.repo_endpoint("pulls"),
                Some(&serde_json::json!({
                    "title": req.title,
                    "head": req.head_branch,
                    "base": req.base_branch,
                    "body": req.body,
                })),
            )
            .await?;

        info!("created pull request #{}", pr.number);

        Ok(pr.into())
    }

    async fn update_pr(&self, req: UpdatePrRequest) -> Result<()> {
        self.instance
            .pulls(&self.config.owner, &self.config.repo)
            .update(req.pr_number)
            .title(req.title)
            .body(req.body)
            .send()
            .await?;

        Ok(())
    }

    async fn close_pr(&self, pr_number: u64) -> Result<()> {
        self.instance
            .pulls(&self.config.owner, &self.config.repo)
            .update(pr_number)
            .state(params::pulls::State::Closed)
            .send()
            .await?;

        Ok(())
    }

    async fn comment_on_pr(&self, pr_number: u64, body: &str) -> Result<()> {
        self.instance
            .issues(&self.config.owner, &self.config.repo)
            .create_comment(pr_number, body)
            .await?;

        Ok(())
    }

    async fn add_pr_labels(&self, req: PrLabelsRequest) -> Result<()> {
        let labels = self.ensure_labels(&req.labels).await?;

        let _: serde_json::Value = self
            .instance
            .post(
                self.repo_endpoint(&format!("issues/{}/labels", req.pr_number)),
                Some(&serde_json::json!({ "labels": labels })),
            )
            .await?;

        Ok(())
    }

    async fn add_pr_reviewers(&self, req: PrReviewersRequest) -> Result<()> {
        let _: serde_json::Value = self
            .instance
            .post(
                self.repo_endpoint(&format!(
                    "pulls/{}/requested_reviewers",
                    req.pr_number
                )),
                Some(&serde_json::json!({ "reviewers": req.reviewers })),
            )
            .await?;

        Ok(())
    }

    async fn add_pr_assignees(&self, req: PrAssigneesRequest) -> Result<()> {
        let _: serde_json::Value = self
            .instance
            .post(
                self.repo_endpoint(&format!(
                    "issues/{}/assignees",
                    req.pr_number
                )),
                Some(&serde_json::json!({ "assignees": req.assignees })),
            )
            .await?;

        Ok(())
    }

    async fn create_issue(&self, req: CreateIssueRequest) -> Result<Issue> {
        let issue: GithubIssue = self
            .instance
            .post(
                self.repo_endpoint("issues"),
                Some(&serde_json::json!({
                    "title": req.title,
                    "body": req.body,
                    "labels": req.labels,
                })),
            )
            .await?;

        Ok(issue.into())
    }

    async fn list_issues(&self, req: ListIssuesRequest) -> Result<Vec<Issue>> {
        let state = if req.include_closed { "all" } else { "open" };
        let mut issues = vec![];
        let mut page = 1;

        loop {
            let mut path = format!(
                "issues?state={state}&per_page={DEFAULT_PAGE_SIZE}&page={page}"
            );
            if !req.labels.is_empty() {
                path = format!("{path}&labels={}", req.labels.join(","));
            }

            let found: Vec<GithubIssue> = self
                .instance
                .get(self.repo_endpoint(&path), None::<&()>)
                .await?;

            let count = found.len();
            issues.extend(
                found
                    .into_iter()
                    .filter(|i| i.pull_request.is_none())
                    .map(Issue::from),
            );

            if count < DEFAULT_PAGE_SIZE as usize {
                break;
            }

            page += 1;
        }

        Ok(issues)
    }

    async fn update_issue(&self, req: UpdateIssueRequest) -> Result<()> {
        let mut body = serde_json::Map::new();

        if let Some(title) = req.title {
            body.insert("title".into(), title.into());
        }

        if let Some(content) = req.body {
            body.insert("body".into(), content.into());
        }

        let _: serde_json::Value = self
            .instance
            .patch(
                self.repo_endpoint(&format!("issues/{}", req.issue_number)),
                Some(&body),
            )
            .await?;

        Ok(())
    }

    async fn close_issue(&self, issue_number: u64) -> Result<()> {
        let _: serde_json::Value = self
            .instance
            .patch(
                self.repo_endpoint(&format!("issues/{issue_number}")),
                Some(&serde_json::json!({ "state": "closed" })),
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::request::FileChange;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path_regex, query_param},
    };

    const REPO: &str = "/repos/stacksjs/buddy-bot";

    fn github(server: &MockServer) -> Github {
        let address = server.address();
        let config = RemoteConfig {
            host: address.ip().to_string(),
            port: Some(address.port()),
            scheme: "http".into(),
            owner: "stacksjs".into(),
            repo: "buddy-bot".into(),
            path: "stacksjs/buddy-bot".into(),
            token: secrecy::SecretString::from("test-token"),
            dry_run: false,
        };
        Github::connect(config, "main".into()).unwrap()
    }

    fn endpoint(suffix: &str) -> String {
        format!("{}{suffix}$", regex::escape(REPO))
    }

    fn not_found() -> ResponseTemplate {
        ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "message": "Not Found",
            "documentation_url": "https://docs.github.com/rest"
        }))
    }

    async fn mount_branch(server: &MockServer, branch: &str, sha: &str) {
        Mock::given(method("GET"))
            .and(path_regex(endpoint(&format!("/git/ref/heads/{branch}"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({
                    "ref": format!("refs/heads/{branch}"),
                    "node_id": "REF_node",
                    "url": "https://api.github.com/repos/stacksjs/buddy-bot/git/refs/heads/x",
                    "object": {
                        "type": "commit",
                        "sha": sha,
                        "url": "https://api.github.com/repos/stacksjs/buddy-bot/git/commits/x"
                    }
                }),
            ))
            .mount(server)
            .await;
    }

    async fn mount_parent(server: &MockServer, sha: &str, tree: &str) {
        Mock::given(method("GET"))
            .and(path_regex(endpoint(&format!("/git/commits/{sha}"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "sha": sha, "tree": { "sha": tree } }),
            ))
            .mount(server)
            .await;
    }

    fn commit_request(branch: &str) -> CreateCommitRequest {
        CreateCommitRequest {
            branch: branch.into(),
            message: "chore(deps): update dependency lodash to 4.17.21".into(),
            file_changes: vec![FileChange {
                path: "./package.json".into(),
                content: "{}".into(),
            }],
            allow_empty: false,
        }
    }

    #[tokio::test]
    async fn unchanged_tree_creates_no_commit() {
        let server = MockServer::start().await;
        let branch = "update-lodash-1";

        mount_branch(&server, branch, "parent-sha").await;
        mount_parent(&server, "parent-sha", "tree-sha").await;
        Mock::given(method("POST"))
            .and(path_regex(endpoint("/git/trees")))
            .and(body_partial_json(serde_json::json!({ "base_tree": "tree-sha" })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({ "sha": "tree-sha" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(endpoint("/git/commits")))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let commit = github(&server)
            .create_commit(commit_request(branch))
            .await
            .unwrap();

        assert_eq!(commit, None);
    }

    #[tokio::test]
    async fn changed_tree_commits_and_moves_the_branch() {
        let server = MockServer::start().await;
        let branch = "update-lodash-2";

        mount_branch(&server, branch, "parent-sha").await;
        mount_parent(&server, "parent-sha", "tree-sha").await;
        Mock::given(method("POST"))
            .and(path_regex(endpoint("/git/trees")))
            .and(body_partial_json(serde_json::json!({
                "tree": [{ "path": "package.json", "mode": "100644", "type": "blob" }]
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({ "sha": "new-tree" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(endpoint("/git/commits")))
            .and(body_partial_json(serde_json::json!({
                "tree": "new-tree",
                "parents": ["parent-sha"]
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({ "sha": "commit-sha" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path_regex(endpoint(&format!("/git/refs/heads/{branch}"))))
            .and(body_partial_json(serde_json::json!({ "sha": "commit-sha" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let commit = github(&server)
            .create_commit(commit_request(branch))
            .await
            .unwrap();

        assert_eq!(
            commit,
            Some(Commit {
                sha: "commit-sha".into()
            })
        );
    }

    #[tokio::test]
    async fn missing_branch_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(endpoint("/git/ref/heads/gone")))
            .respond_with(not_found())
            .mount(&server)
            .await;

        let branch = github(&server).get_branch("gone").await.unwrap();

        assert_eq!(branch, None);
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(endpoint("/contents/package.json")))
            .respond_with(not_found())
            .mount(&server)
            .await;

        let content = github(&server)
            .get_file_content(GetFileContentRequest {
                branch: Some("main".into()),
                path: "package.json".into(),
            })
            .await
            .unwrap();

        assert_eq!(content, None);
    }

    fn pull_payload(number: u64) -> serde_json::Value {
        serde_json::json!({
            "number": number,
            "title": format!("chore(deps): update dependency pkg-{number} to 2.0.0"),
            "body": null,
            "state": "open",
            "merged_at": null,
            "head": { "ref": format!("buddy-bot/update-pkg-{number}-1"), "sha": "abc" },
            "base": { "ref": "main", "sha": "def" },
            "labels": [],
            "user": { "login": "github-actions[bot]" }
        })
    }

    #[tokio::test]
    async fn lists_open_pull_requests_across_pages() {
        let server = MockServer::start().await;
        let full_page = (1..=DEFAULT_PAGE_SIZE as u64)
            .map(pull_payload)
            .collect::<Vec<_>>();

        Mock::given(method("GET"))
            .and(path_regex(endpoint("/pulls")))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(full_page))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(endpoint("/pulls")))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(vec![pull_payload(101)]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let prs = github(&server).list_open_pull_requests().await.unwrap();

        assert_eq!(prs.len(), 101);
        assert_eq!(prs[100].number, 101);
        assert_eq!(prs[100].head_branch, "buddy-bot/update-pkg-101-1");
    }

    #[tokio::test]
    async fn existing_labels_beyond_the_first_page_are_not_recreated() {
        let server = MockServer::start().await;
        let full_page = (0..DEFAULT_PAGE_SIZE)
            .map(|i| serde_json::json!({ "name": format!("label-{i}") }))
            .collect::<Vec<_>>();

        Mock::given(method("GET"))
            .and(path_regex(endpoint("/labels")))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(full_page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(endpoint("/labels")))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!([{ "name": "dependencies" }]),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(endpoint("/labels")))
            .respond_with(ResponseTemplate::new(422))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(endpoint("/issues/9/labels")))
            .and(body_partial_json(
                serde_json::json!({ "labels": ["dependencies"] }),
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([])),
            )
            .expect(1)
            .mount(&server)
            .await;

        github(&server)
            .add_pr_labels(PrLabelsRequest {
                pr_number: 9,
                labels: vec!["dependencies".into()],
            })
            .await
            .unwrap();
    }
}
