//! Package registries consulted by manifest handlers for the latest
//! published version of a dependency.
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::Result;

/// crates.io registry client.
pub mod crates_io;

/// npm registry client.
pub mod npm;

/// User agent sent to public registries.
pub const USER_AGENT: &str =
    concat!("buddy-bot/", env!("CARGO_PKG_VERSION"));

#[cfg_attr(test, automock)]
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Latest stable version published for `name`, or `None` when the
    /// registry does not know the package.
    async fn latest_version(&self, name: &str) -> Result<Option<String>>;
}
