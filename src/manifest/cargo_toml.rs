use async_trait::async_trait;
use log::*;
use std::path::Path;
use toml_edit::{DocumentMut, Item, TableLike, Value};

use crate::{
    Result,
    manifest::{ManifestHandler, ManifestType},
    registry::VersionSource,
    update::{DependencyType, PackageUpdate},
    version,
};

const DEPENDENCY_TABLES: &[(&[&str], DependencyType)] = &[
    (&["dependencies"], DependencyType::Dependencies),
    (&["dev-dependencies"], DependencyType::DevDependencies),
    (&["build-dependencies"], DependencyType::BuildDependencies),
    (&["workspace", "dependencies"], DependencyType::Dependencies),
];

/// Registry dependency read out of a manifest, owned so lookups can be
/// awaited without holding on to the parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeclaredDependency {
    key: String,
    registry_name: String,
    current_version: String,
    dependency_type: DependencyType,
}

/// Handles `Cargo.toml` manifests, including `[workspace.dependencies]`.
pub struct CargoToml {
    source: Box<dyn VersionSource>,
}

impl CargoToml {
    pub fn new(source: Box<dyn VersionSource>) -> Self {
        Self { source }
    }

    fn table<'a>(
        doc: &'a DocumentMut,
        path: &[&str],
    ) -> Option<&'a dyn TableLike> {
        let mut item = doc.as_item();
        for key in path.iter() {
            item = item.as_table_like()?.get(key)?;
        }
        item.as_table_like()
    }

    fn table_mut<'a>(
        doc: &'a mut DocumentMut,
        path: &[&str],
    ) -> Option<&'a mut dyn TableLike> {
        let mut item = doc.as_item_mut();
        for key in path.iter() {
            item = item.as_table_like_mut()?.get_mut(key)?;
        }
        item.as_table_like_mut()
    }

    /// Version requirement of a registry dependency. Path, git and
    /// workspace-inherited dependencies have none.
    fn declared_version(item: &Item) -> Option<&str> {
        if let Some(version) = item.as_str() {
            return Some(version);
        }

        let table = item.as_table_like()?;

        if table.contains_key("path")
            || table.contains_key("git")
            || table.contains_key("workspace")
        {
            return None;
        }

        table.get("version")?.as_str()
    }

    /// Registry name of a dependency, honouring `package = "..."` renames.
    fn registry_name<'a>(key: &'a str, item: &'a Item) -> &'a str {
        item.as_table_like()
            .and_then(|t| t.get("package"))
            .and_then(|p| p.as_str())
            .unwrap_or(key)
    }

    fn declared_dependencies(content: &str) -> Result<Vec<DeclaredDependency>> {
        let doc = content.parse::<DocumentMut>()?;
        let mut declared = vec![];

        for (table_path, dependency_type) in DEPENDENCY_TABLES.iter() {
            let Some(table) = Self::table(&doc, table_path) else {
                continue;
            };

            for (key, item) in table.iter() {
                let Some(current) = Self::declared_version(item) else {
                    debug!("skipping non-registry dependency: {key}");
                    continue;
                };

                declared.push(DeclaredDependency {
                    key: key.to_string(),
                    registry_name: Self::registry_name(key, item).to_string(),
                    current_version: current.to_string(),
                    dependency_type: dependency_type.clone(),
                });
            }
        }

        Ok(declared)
    }

    fn set_version(item: &mut Item, new_version: &str) {
        let target = if item.is_str() {
            item.as_value_mut()
        } else {
            item.as_table_like_mut()
                .and_then(|t| t.get_mut("version"))
                .and_then(|v| v.as_value_mut())
        };

        if let Some(value) = target {
            let decor = value.decor().clone();
            *value = Value::from(new_version);
            *value.decor_mut() = decor;
        }
    }
}

#[async_trait]
impl ManifestHandler for CargoToml {
    fn manifest_type(&self) -> ManifestType {
        ManifestType::CargoToml
    }

    fn detect(&self, path: &Path) -> bool {
        path.file_name().is_some_and(|n| n == "Cargo.toml")
    }

    async fn parse(
        &self,
        path: &str,
        content: &str,
    ) -> Result<Vec<PackageUpdate>> {
        let declared = Self::declared_dependencies(content)?;
        let mut updates = vec![];

        for dep in declared.into_iter() {
            let name = dep.registry_name.as_str();

            let latest = match self.source.latest_version(name).await {
                Ok(Some(latest)) => latest,
                Ok(None) => continue,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!("failed to look up latest version of {name}: {err}");
                    continue;
                }
            };

            if !version::is_newer(&dep.current_version, &latest) {
                continue;
            }

            updates.push(PackageUpdate {
                update_type: version::classify(&dep.current_version, &latest),
                name: dep.key,
                current_version: dep.current_version,
                new_version: latest,
                dependency_type: dep.dependency_type,
                source_file: path.to_string(),
            });
        }

        debug!("found {} candidate updates in {path}", updates.len());

        Ok(updates)
    }

    fn apply_updates(
        &self,
        _path: &str,
        content: &str,
        updates: &[PackageUpdate],
    ) -> Result<String> {
        let mut doc = content.parse::<DocumentMut>()?;

        for (table_path, _) in DEPENDENCY_TABLES.iter() {
            let Some(table) = Self::table_mut(&mut doc, table_path) else {
                continue;
            };

            for update in updates.iter() {
                let Some(item) = table.get_mut(&update.name) else {
                    continue;
                };

                if Self::declared_version(item)
                    != Some(update.current_version.as_str())
                {
                    continue;
                }

                let new_version = version::format_new_version(
                    &update.current_version,
                    &update.new_version,
                );

                info!("setting {} to {new_version}", update.name);

                Self::set_version(item, &new_version);
            }
        }

        Ok(doc.to_string())
    }
}
