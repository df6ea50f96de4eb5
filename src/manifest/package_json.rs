use async_trait::async_trait;
use log::*;
use regex::{Captures, Regex};
use serde_json::Value;
use std::{collections::HashMap, path::Path};

use crate::{
    Result,
    manifest::{ManifestHandler, ManifestType},
    registry::VersionSource,
    update::{DependencyType, PackageUpdate},
    version,
};

const DEPENDENCY_SECTIONS: &[(&str, DependencyType)] = &[
    ("dependencies", DependencyType::Dependencies),
    ("devDependencies", DependencyType::DevDependencies),
    ("peerDependencies", DependencyType::PeerDependencies),
    ("optionalDependencies", DependencyType::OptionalDependencies),
];

/// Specifiers that do not resolve through the registry.
const NON_REGISTRY_PREFIXES: &[&str] = &[
    "workspace:",
    "file:",
    "link:",
    "portal:",
    "patch:",
    "npm:",
    "git",
    "github:",
    "http:",
    "https:",
];

/// Handles `package.json` manifests.
pub struct PackageJson {
    source: Box<dyn VersionSource>,
}

impl PackageJson {
    pub fn new(source: Box<dyn VersionSource>) -> Self {
        Self { source }
    }

    fn is_registry_spec(spec: &str) -> bool {
        let spec = spec.trim();
        !NON_REGISTRY_PREFIXES.iter().any(|p| spec.starts_with(p))
            && !spec.contains("||")
            && !spec.contains(' ')
    }

    async fn lookup(
        &self,
        name: &str,
        cache: &mut HashMap<String, Option<String>>,
    ) -> Result<Option<String>> {
        if let Some(latest) = cache.get(name) {
            return Ok(latest.clone());
        }

        let latest = match self.source.latest_version(name).await {
            Ok(latest) => latest,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!("failed to look up latest version of {name}: {err}");
                None
            }
        };

        cache.insert(name.to_string(), latest.clone());

        Ok(latest)
    }
}

#[async_trait]
impl ManifestHandler for PackageJson {
    fn manifest_type(&self) -> ManifestType {
        ManifestType::PackageJson
    }

    fn detect(&self, path: &Path) -> bool {
        path.file_name().is_some_and(|n| n == "package.json")
    }

    async fn parse(
        &self,
        path: &str,
        content: &str,
    ) -> Result<Vec<PackageUpdate>> {
        let doc: Value = serde_json::from_str(content)?;
        let mut cache = HashMap::new();
        let mut updates = vec![];

        for (section, dependency_type) in DEPENDENCY_SECTIONS.iter() {
            let Some(deps) = doc.get(section).and_then(|d| d.as_object())
            else {
                continue;
            };

            for (name, spec) in deps.iter() {
                let Some(current) = spec.as_str() else {
                    continue;
                };

                if !version::is_dynamic(current)
                    && !Self::is_registry_spec(current)
                {
                    debug!("skipping non-registry dependency {name}: {current}");
                    continue;
                }

                let Some(latest) = self.lookup(name, &mut cache).await? else {
                    continue;
                };

                if !version::is_dynamic(current)
                    && !version::is_newer(current, &latest)
                {
                    continue;
                }

                updates.push(PackageUpdate {
                    name: name.clone(),
                    current_version: current.to_string(),
                    new_version: version::strip_operators(&latest).to_string(),
                    update_type: version::classify(current, &latest),
                    dependency_type: dependency_type.clone(),
                    source_file: path.to_string(),
                });
            }
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
        let mut content = content.to_string();

        for update in updates.iter() {
            let pattern = format!(
                r#"("{}"\s*:\s*"){}(")"#,
                regex::escape(&update.name),
                regex::escape(&update.current_version)
            );
            let re = Regex::new(&pattern)?;
            let new_value = version::format_new_version(
                &update.current_version,
                &update.new_version,
            );

            content = re
                .replace_all(&content, |caps: &Captures| {
                    format!("{}{}{}", &caps[1], new_value, &caps[2])
                })
                .to_string();
        }

        Ok(content)
    }
}
