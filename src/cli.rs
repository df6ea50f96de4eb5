//! CLI argument parsing and remote repository configuration.
use clap::{Parser, Subcommand};
use git_url_parse::GitUrl;
use secrecy::SecretString;
use std::{env, path::PathBuf};

use crate::{BuddyError, Result, forge::config::RemoteConfig};

pub mod cleanup;
pub mod common;
pub mod scan;
pub mod update;

pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Global CLI arguments for the remote repository and logging.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long, default_value = "", global = true)]
    /// GitHub repository URL (https://github.com/owner/repo).
    pub github_repo: String,

    #[arg(long, default_value = "", global = true)]
    /// GitHub access token. Falls back to GITHUB_TOKEN env var.
    pub github_token: String,

    #[arg(long, default_value = ".", global = true)]
    /// Local clone used for scanning and native commits.
    pub repo_path: PathBuf,

    #[arg(long, global = true)]
    /// Configuration file (default: <repo-path>/buddy-bot.toml).
    pub config: Option<PathBuf>,

    #[arg(long, default_value_t = false, global = true)]
    /// Log remote writes instead of performing them.
    pub dry_run: bool,

    #[arg(long, default_value_t = false, global = true)]
    /// Enable debug logging.
    pub debug: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scan manifests and bring one pull request per update group in sync.
    Update {
        #[arg(long, default_value_t = false)]
        /// Skip the branch cleanup pass even when enabled in configuration.
        no_cleanup: bool,
    },

    /// Delete branches that no longer back an open pull request.
    Cleanup,

    /// Print the grouped updates as JSON without writing anything.
    Scan {
        #[arg(long)]
        /// Write the JSON to this file instead of stdout.
        out_file: Option<String>,
    },
}

impl Args {
    /// Configure the remote repository connection from CLI arguments.
    pub fn get_remote(&self) -> Result<RemoteConfig> {
        if self.github_repo.is_empty() {
            return Err(BuddyError::MissingRepository(
                "set --github-repo".into(),
            ));
        }

        get_github_remote(
            &self.github_repo,
            &self.github_token,
            env::var(GITHUB_TOKEN_ENV).ok(),
            self.dry_run,
        )
    }
}

/// Validate repository URL uses HTTP or HTTPS scheme.
fn validate_scheme(scheme: git_url_parse::Scheme) -> Result<()> {
    match scheme {
        git_url_parse::Scheme::Http => Ok(()),
        git_url_parse::Scheme::Https => Ok(()),
        _ => Err(BuddyError::InvalidRemoteUrl(
            "only http and https schemes are supported for repo urls".into(),
        )),
    }
}

/// Configure GitHub remote with URL parsing and token resolution. The token
/// comes from the flag, then the URL, then the environment.
fn get_github_remote(
    github_repo: &str,
    github_token: &str,
    env_token: Option<String>,
    dry_run: bool,
) -> Result<RemoteConfig> {
    let parsed = GitUrl::parse(github_repo)?;

    validate_scheme(parsed.scheme)?;

    let mut token = github_token.to_string();

    if token.is_empty()
        && let Some(parsed_token) = parsed.token
    {
        token = parsed_token;
    }

    if token.is_empty()
        && let Some(env_token) = env_token
    {
        token = env_token;
    }

    if token.is_empty() {
        return Err(BuddyError::MissingToken);
    }

    let host = parsed.host.ok_or_else(|| {
        BuddyError::InvalidRemoteUrl(format!(
            "unable to parse host from {github_repo}"
        ))
    })?;

    let owner = parsed.owner.ok_or_else(|| {
        BuddyError::InvalidRemoteUrl(format!(
            "unable to parse owner from {github_repo}"
        ))
    })?;

    let path = parsed
        .path
        .trim_start_matches('/')
        .trim_end_matches(".git")
        .to_string();

    Ok(RemoteConfig {
        host,
        port: parsed.port,
        scheme: parsed.scheme.to_string(),
        owner,
        repo: parsed.name,
        path,
        token: SecretString::from(token),
        dry_run,
    })
}
