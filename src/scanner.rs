//! Merges the update lists produced by manifest handlers into one filtered,
//! de-duplicated and deterministically ordered list.
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::*;
use std::{collections::HashSet, path::Path};
use walkdir::{DirEntry, WalkDir};

use crate::{
    Result, config::Config, manifest::ManifestRegistry,
    update::PackageUpdate, update::Strategy, version,
};

/// Directories never searched for manifests.
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", ".git", "vendor"];

pub struct UpdateScanner<'a> {
    registry: &'a ManifestRegistry,
    ignore: GlobSet,
    strategy: Strategy,
    respect_latest: bool,
}

impl<'a> UpdateScanner<'a> {
    pub fn new(config: &Config, registry: &'a ManifestRegistry) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();

        for pattern in config.ignore.iter() {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            registry,
            ignore: builder.build()?,
            strategy: config.strategy,
            respect_latest: config.respect_latest,
        })
    }

    /// Walks `root`, parses every recognised manifest and aggregates the
    /// proposed updates. A manifest that fails to parse is logged and
    /// skipped.
    pub async fn scan(&self, root: &Path) -> Result<Vec<PackageUpdate>> {
        let mut lists = vec![];

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e));

        for entry in walker {
            let entry = entry?;

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(handler) = self.registry.handler_for(entry.path()) else {
                continue;
            };

            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");

            info!("scanning manifest: {relative}");

            let content = tokio::fs::read_to_string(entry.path()).await?;

            match handler.parse(&relative, &content).await {
                Ok(updates) => lists.push(updates),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => warn!("failed to parse manifest {relative}: {err}"),
            }
        }

        Ok(self.aggregate(lists))
    }

    /// Applies, in order: ignore patterns, the update strategy,
    /// de-duplication, the no-downgrade rule and the dynamic-version
    /// policy. The result is sorted by severity, highest first, then name.
    pub fn aggregate(&self, lists: Vec<Vec<PackageUpdate>>) -> Vec<PackageUpdate> {
        let mut seen = HashSet::new();

        let mut updates = lists
            .into_iter()
            .flatten()
            .filter(|u| {
                let ignored = self.ignore.is_match(&u.name);
                if ignored {
                    debug!("ignoring {}: matches ignore pattern", u.name);
                }
                !ignored
            })
            .filter(|u| self.strategy.allows(u.update_type))
            .filter(|u| {
                seen.insert((
                    u.name.clone(),
                    u.current_version.clone(),
                    u.new_version.clone(),
                    u.source_file.clone(),
                ))
            })
            .filter(|u| {
                if self.respect_latest && version::is_dynamic(&u.current_version)
                {
                    debug!(
                        "keeping {} at {}: dynamic versions are respected",
                        u.name, u.current_version
                    );
                    return false;
                }
                if version::is_dynamic(&u.current_version) {
                    return true;
                }
                if !version::is_newer(&u.current_version, &u.new_version) {
                    return false;
                }
                if version::is_in_range(&u.current_version, &u.new_version) {
                    debug!(
                        "{} {} already admits {}: pinning it explicitly",
                        u.name, u.current_version, u.new_version
                    );
                }
                true
            })
            .collect::<Vec<PackageUpdate>>();

        updates.sort_by(|a, b| {
            b.update_type
                .cmp(&a.update_type)
                .then_with(|| a.name.cmp(&b.name))
        });

        updates
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}
