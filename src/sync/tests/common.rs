//! Common test utilities for sync engine tests.

use std::{rc::Rc, time::Duration};

use crate::{
    config::Config,
    forge::{
        config::RemoteConfig,
        manager::{ForgeManager, RetryPolicy},
        traits::MockForge,
    },
    manifest::{ManifestRegistry, package_json::PackageJson},
    registry::MockVersionSource,
    sync::{SyncEngine, config::SyncConfig},
    test_helpers::package_update,
    update::UpdateGroup,
    workspace::{MockWorkspace, Workspace},
};

pub use crate::forge::request::{Commit, PullRequestRecord};
pub use crate::test_helpers::{pr_record, remote_branch};

pub const PACKAGE_JSON: &str = r#"{
  "name": "app",
  "dependencies": {
    "lodash": "^4.17.20",
    "react": "^17.0.0"
  }
}
"#;

pub fn lodash_group() -> UpdateGroup {
    UpdateGroup::new(
        "Non-Major Updates",
        vec![package_update("lodash", "^4.17.20", "4.17.21")],
    )
}

pub fn react_group() -> UpdateGroup {
    UpdateGroup::new(
        "Major Update - react",
        vec![package_update("react", "^17.0.0", "18.2.0")],
    )
}

/// Mock forge with a default remote config. Further expectations can be set
/// before handing it to one of the engine constructors.
pub fn mock_forge() -> MockForge {
    let mut mock_forge = MockForge::new();
    mock_forge
        .expect_remote_config()
        .returning(RemoteConfig::default);
    mock_forge
}

/// Serves `content` for `package.json` on any branch.
pub fn serve_manifest(mock_forge: &mut MockForge, content: &'static str) {
    mock_forge
        .expect_get_file_content()
        .returning(move |_| Ok(Some(content.to_string())));
}

fn manifests() -> Rc<ManifestRegistry> {
    let mut registry = ManifestRegistry::new();
    registry.register(Box::new(PackageJson::new(Box::new(
        MockVersionSource::new(),
    ))));
    Rc::new(registry)
}

fn sync_config(toml_config: Config) -> Rc<SyncConfig> {
    Rc::new(
        SyncConfig::builder()
            .toml_config(Rc::new(toml_config))
            .repo_default_branch("main")
            .build()
            .unwrap(),
    )
}

fn forge_manager(mock_forge: MockForge) -> Rc<ForgeManager> {
    Rc::new(ForgeManager::new(Box::new(mock_forge)).with_retry_policy(
        RetryPolicy {
            max_retries: 0,
            base_delay: Duration::ZERO,
        },
    ))
}

/// Creates an engine that commits through the forge API.
pub fn create_test_engine(mock_forge: MockForge) -> SyncEngine {
    create_test_engine_with_config(mock_forge, Config::default())
}

pub fn create_test_engine_with_config(
    mock_forge: MockForge,
    toml_config: Config,
) -> SyncEngine {
    SyncEngine::builder()
        .config(sync_config(toml_config))
        .forge(forge_manager(mock_forge))
        .manifests(manifests())
        .build()
        .unwrap()
}

/// Creates an engine that commits through `workspace`.
pub fn create_test_engine_with_workspace(
    mock_forge: MockForge,
    workspace: MockWorkspace,
) -> SyncEngine {
    let workspace: Rc<dyn Workspace> = Rc::new(workspace);

    SyncEngine::builder()
        .config(sync_config(Config::default()))
        .forge(forge_manager(mock_forge))
        .manifests(manifests())
        .workspace(Some(workspace))
        .build()
        .unwrap()
}
