//! Manifest collaborators. Each handler knows how to recognise one kind of
//! dependency manifest, propose updates for it and write those updates back
//! without disturbing the rest of the file.
use async_trait::async_trait;
use log::*;
use std::{collections::BTreeMap, path::Path};

use crate::{
    Result,
    file_loader::FileLoader,
    forge::request::FileChange,
    registry::{
        crates_io::{CratesIo, DEFAULT_CRATES_IO_API},
        npm::{DEFAULT_NPM_REGISTRY, NpmRegistry},
    },
    update::PackageUpdate,
};

pub mod cargo_toml;
pub mod package_json;

use cargo_toml::CargoToml;
use package_json::PackageJson;

/// Kinds of manifests the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ManifestType {
    PackageJson,
    CargoToml,
}

#[async_trait]
pub trait ManifestHandler: Send + Sync {
    fn manifest_type(&self) -> ManifestType;

    /// True when `path` is a manifest this handler owns.
    fn detect(&self, path: &Path) -> bool;

    /// Proposes updates for every dependency declared in `content`.
    async fn parse(
        &self,
        path: &str,
        content: &str,
    ) -> Result<Vec<PackageUpdate>>;

    /// Rewrites only the version values of `updates`, keeping the original
    /// range prefix unless the proposed value already carries one.
    fn apply_updates(
        &self,
        path: &str,
        content: &str,
        updates: &[PackageUpdate],
    ) -> Result<String>;
}

/// Static registry of manifest handlers keyed by manifest type.
#[derive(Default)]
pub struct ManifestRegistry {
    handlers: BTreeMap<ManifestType, Box<dyn ManifestHandler>>,
}

impl ManifestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry wired to the public npm registry and crates.io.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Box::new(PackageJson::new(Box::new(
            NpmRegistry::new(DEFAULT_NPM_REGISTRY)?,
        ))));
        registry.register(Box::new(CargoToml::new(Box::new(CratesIo::new(
            DEFAULT_CRATES_IO_API,
        )?))));
        Ok(registry)
    }

    pub fn register(&mut self, handler: Box<dyn ManifestHandler>) {
        self.handlers.insert(handler.manifest_type(), handler);
    }

    pub fn handler_for(&self, path: &Path) -> Option<&dyn ManifestHandler> {
        self.handlers
            .values()
            .find(|h| h.detect(path))
            .map(|h| h.as_ref())
    }

    /// Builds the file changes for `updates`, reading current content from
    /// `loader`. Files whose content would not change are left out.
    pub async fn generate_changes(
        &self,
        loader: &dyn FileLoader,
        branch: Option<String>,
        updates: &[PackageUpdate],
    ) -> Result<Vec<FileChange>> {
        let mut by_file: BTreeMap<&str, Vec<PackageUpdate>> = BTreeMap::new();

        for update in updates.iter() {
            by_file
                .entry(update.source_file.as_str())
                .or_default()
                .push(update.clone());
        }

        let mut changes = vec![];

        for (path, file_updates) in by_file.into_iter() {
            let Some(handler) = self.handler_for(Path::new(path)) else {
                warn!("no manifest handler registered for {path}: skipping");
                continue;
            };

            let Some(content) =
                loader.load_file(branch.clone(), path.to_string()).await?
            else {
                warn!("manifest {path} no longer exists: skipping");
                continue;
            };

            let updated = handler.apply_updates(path, &content, &file_updates)?;

            if updated == content {
                debug!("manifest {path} already up to date");
                continue;
            }

            changes.push(FileChange {
                path: path.to_string(),
                content: updated,
            });
        }

        Ok(changes)
    }
}
