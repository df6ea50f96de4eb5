//! Common test helper functions shared across test modules.
use secrecy::SecretString;

use crate::{
    forge::{
        config::RemoteConfig,
        request::{PrState, PullRequestRecord, RemoteBranch},
    },
    update::{DependencyType, PackageUpdate},
    version,
};

/// Creates a test RemoteConfig with sensible defaults.
pub fn create_test_remote_config() -> RemoteConfig {
    RemoteConfig {
        host: "github.com".to_string(),
        port: None,
        scheme: "https".to_string(),
        owner: "test".to_string(),
        repo: "repo".to_string(),
        path: "test/repo".to_string(),
        token: SecretString::from("test-token".to_string()),
        dry_run: false,
    }
}

/// A root `package.json` dependency update classified from its versions.
pub fn package_update(name: &str, from: &str, to: &str) -> PackageUpdate {
    PackageUpdate {
        name: name.to_string(),
        current_version: from.to_string(),
        new_version: to.to_string(),
        update_type: version::classify(from, to),
        dependency_type: DependencyType::Dependencies,
        source_file: "package.json".to_string(),
    }
}

/// An open pull request authored by the default bot identity.
pub fn pr_record(number: u64, title: &str, head_branch: &str) -> PullRequestRecord {
    PullRequestRecord {
        number,
        title: title.to_string(),
        head_branch: head_branch.to_string(),
        head_sha: format!("sha-{number}"),
        base_branch: "main".to_string(),
        state: PrState::Open,
        body: String::new(),
        labels: vec!["dependencies".to_string()],
        author: crate::config::DEFAULT_BOT_IDENTITY.to_string(),
    }
}

pub fn remote_branch(
    name: &str,
    head_sha: &str,
    last_commit_timestamp: Option<i64>,
) -> RemoteBranch {
    RemoteBranch {
        name: name.to_string(),
        head_sha: head_sha.to_string(),
        last_commit_timestamp,
    }
}
