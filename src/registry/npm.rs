use async_trait::async_trait;
use log::*;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::{
    Result,
    registry::{USER_AGENT, VersionSource},
    retry::RetryPolicy,
};

pub const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org/";

#[derive(Debug, Deserialize)]
struct DistTags {
    latest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PackageDocument {
    #[serde(rename = "dist-tags")]
    dist_tags: Option<DistTags>,
}

/// Looks up `dist-tags.latest` from an npm compatible registry.
pub struct NpmRegistry {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl NpmRegistry {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        let base_url = Url::parse(base_url)?;
        Ok(Self {
            client,
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_latest(&self, name: &str) -> Result<Option<String>> {
        // scoped packages keep the "@" but encode the separator
        let url = self.base_url.join(&name.replace('/', "%2f"))?;

        debug!("fetching npm metadata: {url}");

        let response = self
            .client
            .get(url)
            .header("Accept", "application/vnd.npm.install-v1+json")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!("package not found in npm registry: {name}");
            return Ok(None);
        }

        let doc: PackageDocument = response.error_for_status()?.json().await?;

        Ok(doc.dist_tags.and_then(|t| t.latest))
    }
}

#[async_trait]
impl VersionSource for NpmRegistry {
    async fn latest_version(&self, name: &str) -> Result<Option<String>> {
        self.retry
            .run("npm lookup", || self.fetch_latest(name))
            .await
    }
}
