//! Native git working tree operations used to apply one group's changes at
//! a time.
//!
//! Every group starts from a clean checkout of the base branch. The working
//! tree only ever holds the edits of a single group between two resets.
use git2::{
    BranchType, FileFavor, MergeOptions, RemoteCallbacks, ResetType,
    StatusOptions, build::CheckoutBuilder,
};
use log::*;
use secrecy::{ExposeSecret, SecretString};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[cfg(test)]
use mockall::automock;

use crate::{BuddyError, Result, forge::request::FileChange};

/// Remote the working tree was cloned from.
const DEFAULT_REMOTE: &str = "origin";
/// Username sent alongside the token for HTTPS authentication.
const TOKEN_USER: &str = "x-access-token";
const FALLBACK_COMMITTER_NAME: &str = "buddy-bot";
const FALLBACK_COMMITTER_EMAIL: &str = "buddy-bot@users.noreply.github.com";

/// Result of merging the base branch into a pull-request branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    UpToDate,
    FastForward,
    Merged,
    /// Conflicting hunks were resolved by taking the base side
    ResolvedFavoringBase,
    /// Both attempts failed; the branch is left as it was
    Unresolved(String),
}

#[cfg_attr(test, automock)]
pub trait Workspace {
    /// Root directory of the working tree.
    fn root(&self) -> Result<PathBuf>;
    /// Discards all local changes and checks out the remote tip of `base`.
    fn reset_to_base(&self, base: &str) -> Result<()>;
    /// Creates `branch` at the current HEAD and switches to it.
    fn create_branch(&self, branch: &str) -> Result<()>;
    /// Checks out the remote tip of an existing `branch`.
    fn checkout_existing(&self, branch: &str) -> Result<()>;
    /// Merges the remote tip of `base` into the checked out branch.
    fn merge_base(&self, base: &str) -> Result<MergeOutcome>;
    fn write_files(&self, changes: &[FileChange]) -> Result<()>;
    /// True when the working tree differs from HEAD.
    fn has_changes(&self) -> Result<bool>;
    /// Stages everything and commits, returning the new commit SHA.
    fn commit(&self, message: &str) -> Result<String>;
    fn push(&self, branch: &str, force: bool) -> Result<()>;
}

fn get_auth_callbacks<'r>(token: String) -> RemoteCallbacks<'r> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, _username, _allowed| {
        git2::Cred::userpass_plaintext(TOKEN_USER, &token)
    });
    callbacks
}

/// Rejections for workflow files surface as plain transport errors, so the
/// message is the only signal available.
fn classify_push_error(err: git2::Error) -> BuddyError {
    let message = err.message().to_lowercase();

    if message.contains("workflow")
        || message.contains("permission")
        || message.contains("403")
    {
        return BuddyError::permission(err.message());
    }

    err.into()
}

/// git2 backed workspace operating on an existing clone.
pub struct GitWorkspace {
    repo: git2::Repository,
    token: SecretString,
}

impl GitWorkspace {
    pub fn open(path: &Path, token: SecretString) -> Result<Self> {
        let repo = git2::Repository::open(path)?;

        if repo.workdir().is_none() {
            return Err(BuddyError::InvalidArgs(format!(
                "repository at {} has no working directory",
                path.display()
            )));
        }

        Ok(Self { repo, token })
    }

    fn fetch(&self, branch: &str) -> Result<()> {
        debug!("fetching {branch} from {DEFAULT_REMOTE}");

        let callbacks = get_auth_callbacks(self.token.expose_secret().to_string());
        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);

        let mut remote = self.repo.find_remote(DEFAULT_REMOTE)?;
        let ref_spec =
            format!("+refs/heads/{branch}:refs/remotes/{DEFAULT_REMOTE}/{branch}");
        remote.fetch(&[ref_spec], Some(&mut fetch_options), None)?;

        Ok(())
    }

    fn remote_commit(&self, branch: &str) -> Result<git2::Commit<'_>> {
        let reference = self
            .repo
            .find_branch(&format!("{DEFAULT_REMOTE}/{branch}"), BranchType::Remote)?;
        Ok(reference.get().peel_to_commit()?)
    }

    /// Points local `branch` at `commit`, checks it out and discards any
    /// tracked or untracked changes.
    fn hard_switch(&self, branch: &str, commit: &git2::Commit<'_>) -> Result<()> {
        // detach first so the branch can be force-moved even when current
        self.repo.set_head_detached(commit.id())?;
        self.repo.branch(branch, commit, true)?;
        self.repo.set_head(&format!("refs/heads/{branch}"))?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        self.repo
            .reset(commit.as_object(), ResetType::Hard, Some(&mut checkout))?;

        self.remove_untracked()
    }

    /// Hard resets leave untracked files in place, and `commit` stages
    /// everything, so they are deleted here.
    fn remove_untracked(&self) -> Result<()> {
        let root = self.root()?;

        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self.repo.statuses(Some(&mut options))?;

        for entry in statuses.iter() {
            if !entry.status().contains(git2::Status::WT_NEW) {
                continue;
            }

            let Some(relative) = entry.path() else {
                continue;
            };

            let path = root.join(relative);
            debug!("removing untracked file: {relative}");

            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }

        Ok(())
    }

    fn signature(&self) -> Result<git2::Signature<'static>> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Ok(git2::Signature::now(
                FALLBACK_COMMITTER_NAME,
                FALLBACK_COMMITTER_EMAIL,
            )?),
        }
    }

    fn abort_merge(&self, head: &git2::Commit<'_>) -> Result<()> {
        self.repo.cleanup_state()?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        self.repo
            .reset(head.as_object(), ResetType::Hard, Some(&mut checkout))?;
        Ok(())
    }

    /// Attempts a real merge, returning `false` when conflicts remain.
    fn try_merge(
        &self,
        base: &str,
        head: &git2::Commit<'_>,
        theirs: &git2::AnnotatedCommit<'_>,
        favor_base: bool,
    ) -> Result<bool> {
        let mut merge_options = MergeOptions::new();
        if favor_base {
            merge_options.file_favor(FileFavor::Theirs);
        }

        let mut checkout = CheckoutBuilder::new();
        checkout.force();

        self.repo
            .merge(&[theirs], Some(&mut merge_options), Some(&mut checkout))?;

        let mut index = self.repo.index()?;

        if index.has_conflicts() {
            self.abort_merge(head)?;
            return Ok(false);
        }

        let tree = self.repo.find_tree(index.write_tree()?)?;
        let base_commit = self.repo.find_commit(theirs.id())?;
        let sig = self.signature()?;

        self.repo.commit(
            Some("HEAD"),
            &sig,
            &sig,
            &format!("Merge branch '{base}'"),
            &tree,
            &[head, &base_commit],
        )?;
        self.repo.cleanup_state()?;

        Ok(true)
    }
}

impl Workspace for GitWorkspace {
    fn root(&self) -> Result<PathBuf> {
        self.repo.workdir().map(|p| p.to_path_buf()).ok_or_else(|| {
            BuddyError::InvalidArgs("repository has no working directory".into())
        })
    }

    fn reset_to_base(&self, base: &str) -> Result<()> {
        info!("resetting working tree to {base}");
        self.fetch(base)?;
        let commit = self.remote_commit(base)?;
        self.hard_switch(base, &commit)
    }

    fn create_branch(&self, branch: &str) -> Result<()> {
        info!("creating branch: {branch}");
        let head = self.repo.head()?;
        let commit = head.peel_to_commit()?;
        self.repo.branch(branch, &commit, true)?;
        self.repo.set_head(&format!("refs/heads/{branch}"))?;
        Ok(())
    }

    fn checkout_existing(&self, branch: &str) -> Result<()> {
        info!("checking out existing branch: {branch}");
        self.fetch(branch)?;
        let commit = self.remote_commit(branch)?;
        self.hard_switch(branch, &commit)
    }

    fn merge_base(&self, base: &str) -> Result<MergeOutcome> {
        self.fetch(base)?;

        let base_ref = self
            .repo
            .find_reference(&format!("refs/remotes/{DEFAULT_REMOTE}/{base}"))?;
        let theirs = self.repo.reference_to_annotated_commit(&base_ref)?;
        let (analysis, _) = self.repo.merge_analysis(&[&theirs])?;

        if analysis.is_up_to_date() {
            debug!("branch already contains {base}");
            return Ok(MergeOutcome::UpToDate);
        }

        if analysis.is_fast_forward() {
            info!("fast-forwarding to {base}");
            let mut head = self.repo.head()?;
            head.set_target(theirs.id(), &format!("fast-forward to {base}"))?;
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            self.repo.checkout_head(Some(&mut checkout))?;
            return Ok(MergeOutcome::FastForward);
        }

        let head = self.repo.head()?.peel_to_commit()?;

        if self.try_merge(base, &head, &theirs, false)? {
            info!("merged {base} cleanly");
            return Ok(MergeOutcome::Merged);
        }

        warn!("merging {base} conflicted: retrying favoring {base}");

        if self.try_merge(base, &head, &theirs, true)? {
            return Ok(MergeOutcome::ResolvedFavoringBase);
        }

        let reason = format!("unresolvable conflicts merging {base}");
        warn!("{reason}: continuing without merge");

        Ok(MergeOutcome::Unresolved(reason))
    }

    fn write_files(&self, changes: &[FileChange]) -> Result<()> {
        let root = self.root()?;

        for change in changes.iter() {
            let path = root.join(&change.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            debug!("writing {}", change.path);
            fs::write(&path, &change.content)?;
        }

        Ok(())
    }

    fn has_changes(&self) -> Result<bool> {
        let mut options = StatusOptions::new();
        options.include_untracked(true).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut options))?;
        Ok(!statuses.is_empty())
    }

    fn commit(&self, message: &str) -> Result<String> {
        debug!("committing changes with msg: {message}");

        let mut index = self.repo.index()?;
        index.add_all(["."], git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let oid = index.write_tree()?;
        let tree = self.repo.find_tree(oid)?;
        let parent_commit = self.repo.head()?.peel_to_commit()?;
        let committer = self.signature()?;

        let oid = self.repo.commit(
            Some("HEAD"),
            &committer,
            &committer,
            message,
            &tree,
            &[&parent_commit],
        )?;

        Ok(oid.to_string())
    }

    fn push(&self, branch: &str, force: bool) -> Result<()> {
        info!("pushing branch {branch}");

        let mut callbacks =
            get_auth_callbacks(self.token.expose_secret().to_string());
        callbacks.push_update_reference(|refname, status| match status {
            Some(msg) => {
                Err(git2::Error::from_str(&format!("{refname}: {msg}")))
            }
            None => Ok(()),
        });

        let mut push_opts = git2::PushOptions::new();
        push_opts.remote_callbacks(callbacks);

        let mut remote = self.repo.find_remote(DEFAULT_REMOTE)?;

        // + indicates "force" push
        let force_marker = if force { "+" } else { "" };
        let ref_spec =
            format!("{force_marker}refs/heads/{branch}:refs/heads/{branch}");

        remote
            .push(&[ref_spec], Some(&mut push_opts))
            .map_err(classify_push_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _origin_dir: TempDir,
        origin: git2::Repository,
        work_dir: TempDir,
        workspace: GitWorkspace,
    }

    fn signature() -> git2::Signature<'static> {
        git2::Signature::now("tester", "tester@example.com").unwrap()
    }

    fn commit_on(
        repo: &git2::Repository,
        refname: &str,
        files: &[(&str, &str)],
        message: &str,
    ) -> git2::Oid {
        let parent = repo
            .find_reference(refname)
            .ok()
            .and_then(|r| r.peel_to_commit().ok());

        let mut builder = match parent.as_ref() {
            Some(p) => repo.treebuilder(Some(&p.tree().unwrap())).unwrap(),
            None => repo.treebuilder(None).unwrap(),
        };

        for (path, content) in files.iter() {
            let blob = repo.blob(content.as_bytes()).unwrap();
            builder.insert(path, blob, 0o100644).unwrap();
        }

        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let parents = parent.iter().collect::<Vec<&git2::Commit>>();

        repo.commit(
            Some(refname),
            &signature(),
            &signature(),
            message,
            &tree,
            &parents,
        )
        .unwrap()
    }

    fn setup() -> Fixture {
        let origin_dir = TempDir::new().unwrap();
        let origin = git2::Repository::init_bare(origin_dir.path()).unwrap();
        commit_on(
            &origin,
            "refs/heads/main",
            &[("package.json", "{\"dependencies\": {\"a\": \"1.0.0\"}}\n")],
            "initial",
        );

        let work_dir = TempDir::new().unwrap();
        let repo = git2::Repository::init(work_dir.path()).unwrap();
        repo.remote(DEFAULT_REMOTE, origin_dir.path().to_str().unwrap())
            .unwrap();

        let workspace =
            GitWorkspace::open(work_dir.path(), SecretString::from("token"))
                .unwrap();
        workspace.reset_to_base("main").unwrap();

        Fixture {
            _origin_dir: origin_dir,
            origin,
            work_dir,
            workspace,
        }
    }

    fn change(path: &str, content: &str) -> FileChange {
        FileChange {
            path: path.into(),
            content: content.into(),
        }
    }

    #[test]
    fn reset_checks_out_base() {
        let fixture = setup();
        let content =
            fs::read_to_string(fixture.work_dir.path().join("package.json"))
                .unwrap();
        assert!(content.contains("1.0.0"));
        assert!(!fixture.workspace.has_changes().unwrap());
    }

    #[test]
    fn reset_discards_local_edits() {
        let fixture = setup();
        let ws = &fixture.workspace;

        ws.write_files(&[change("package.json", "{}"), change("new.txt", "x")])
            .unwrap();
        assert!(ws.has_changes().unwrap());

        ws.reset_to_base("main").unwrap();

        assert!(!ws.has_changes().unwrap());
        assert!(!fixture.work_dir.path().join("new.txt").exists());
    }

    #[test]
    fn untracked_directories_do_not_leak_into_the_next_group() {
        let fixture = setup();
        let ws = &fixture.workspace;

        ws.write_files(&[change("stray/nested/notes.txt", "x")]).unwrap();
        assert!(ws.has_changes().unwrap());

        ws.reset_to_base("main").unwrap();

        assert!(!ws.has_changes().unwrap());
        assert!(!fixture.work_dir.path().join("stray/nested/notes.txt").exists());
    }

    #[test]
    fn identical_content_is_not_a_change() {
        let fixture = setup();
        let ws = &fixture.workspace;

        ws.write_files(&[change(
            "package.json",
            "{\"dependencies\": {\"a\": \"1.0.0\"}}\n",
        )])
        .unwrap();

        assert!(!ws.has_changes().unwrap());
    }

    #[test]
    fn commits_and_pushes_new_branch() {
        let fixture = setup();
        let ws = &fixture.workspace;
        let branch = "buddy-bot/update-non-major-updates-1";

        ws.create_branch(branch).unwrap();
        ws.write_files(&[change(
            "package.json",
            "{\"dependencies\": {\"a\": \"1.0.1\"}}\n",
        )])
        .unwrap();
        assert!(ws.has_changes().unwrap());

        let sha = ws.commit("chore(deps): update dependency a to 1.0.1").unwrap();
        ws.push(branch, false).unwrap();

        let remote_tip = fixture
            .origin
            .find_reference(&format!("refs/heads/{branch}"))
            .unwrap()
            .peel_to_commit()
            .unwrap();
        assert_eq!(remote_tip.id().to_string(), sha);
    }

    #[test]
    fn merge_base_fast_forwards_and_merges() {
        let fixture = setup();
        let ws = &fixture.workspace;
        let branch = "buddy-bot/update-a-1";

        ws.create_branch(branch).unwrap();
        ws.push(branch, false).unwrap();

        // base moves ahead, branch has no commits of its own
        commit_on(
            &fixture.origin,
            "refs/heads/main",
            &[("README.md", "hello\n")],
            "docs",
        );

        ws.checkout_existing(branch).unwrap();
        assert_eq!(ws.merge_base("main").unwrap(), MergeOutcome::FastForward);
        assert_eq!(ws.merge_base("main").unwrap(), MergeOutcome::UpToDate);

        ws.write_files(&[change("other.txt", "x\n")]).unwrap();
        ws.commit("branch work").unwrap();

        commit_on(
            &fixture.origin,
            "refs/heads/main",
            &[("CHANGELOG.md", "notes\n")],
            "changelog",
        );

        assert_eq!(ws.merge_base("main").unwrap(), MergeOutcome::Merged);
        assert!(fixture.work_dir.path().join("CHANGELOG.md").exists());
        assert!(fixture.work_dir.path().join("other.txt").exists());
    }

    #[test]
    fn merge_conflicts_resolve_favoring_base() {
        let fixture = setup();
        let ws = &fixture.workspace;
        let branch = "buddy-bot/update-a-2";

        ws.create_branch(branch).unwrap();
        ws.write_files(&[change(
            "package.json",
            "{\"dependencies\": {\"a\": \"1.0.1\"}}\n",
        )])
        .unwrap();
        ws.commit("bump a").unwrap();

        commit_on(
            &fixture.origin,
            "refs/heads/main",
            &[("package.json", "{\"dependencies\": {\"a\": \"2.0.0\"}}\n")],
            "bump a on main",
        );

        let outcome = ws.merge_base("main").unwrap();
        assert_eq!(outcome, MergeOutcome::ResolvedFavoringBase);

        let content =
            fs::read_to_string(fixture.work_dir.path().join("package.json"))
                .unwrap();
        assert!(content.contains("2.0.0"));
        assert!(!ws.has_changes().unwrap());
    }

    #[test]
    fn workflow_rejections_become_permission_errors() {
        let err = classify_push_error(git2::Error::from_str(
            "refusing to allow a GitHub App to create or update workflow `.github/workflows/ci.yml` without `workflows` permission",
        ));
        assert!(err.is_permission_denied());

        let err = classify_push_error(git2::Error::from_str("connection reset"));
        assert!(!err.is_permission_denied());
    }
}
