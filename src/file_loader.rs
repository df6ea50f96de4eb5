//! File loading abstraction for manifest content retrieval.
//!
//! Manifest handlers rewrite content they get from a loader, so the same
//! code path serves the local working tree and the forge API.
use async_trait::async_trait;
use log::*;
use std::path::PathBuf;

#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Abstraction for loading file content from a source.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FileLoader: Send + Sync {
    /// Load the content of a file from the source.
    ///
    /// # Arguments
    ///
    /// * `branch` - Optional branch name to load the file from
    /// * `path` - Path to the file relative to the repository root
    ///
    /// # Returns
    ///
    /// * `Ok(Some(String))` - File was found and content loaded successfully
    /// * `Ok(None)` - File does not exist at the specified path
    /// * `Err(_)` - An error occurred while attempting to load the file
    async fn load_file(
        &self,
        branch: Option<String>,
        path: String,
    ) -> Result<Option<String>>;
}

/// Loads files from a checked out working tree. The branch argument is
/// ignored since the working tree only ever holds one branch.
pub struct WorkingTreeLoader {
    root: PathBuf,
}

impl WorkingTreeLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileLoader for WorkingTreeLoader {
    async fn load_file(
        &self,
        _branch: Option<String>,
        path: String,
    ) -> Result<Option<String>> {
        let full_path = self.root.join(&path);

        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no file found for path: {path}");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}
