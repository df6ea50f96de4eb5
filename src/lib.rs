pub mod cleanup;
pub mod cli;
pub mod config;
pub mod content;
pub mod dashboard;
pub mod error;
pub mod file_loader;
pub mod forge;
pub mod grouping;
pub mod manifest;
pub mod registry;
pub mod retry;
pub mod scanner;
pub mod sync;
pub mod update;
pub mod version;
pub mod workspace;

pub use error::{BuddyError, Result};

#[cfg(test)]
pub mod test_helpers;
