//! Remote repository access for the sync and cleanup passes.
pub mod config;
pub mod github;
pub mod manager;
pub mod request;
pub mod traits;
