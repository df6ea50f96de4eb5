use async_trait::async_trait;
use log::*;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::{
    Result,
    registry::{USER_AGENT, VersionSource},
    retry::RetryPolicy,
};

pub const DEFAULT_CRATES_IO_API: &str = "https://crates.io/api/v1/crates/";

#[derive(Debug, Deserialize)]
struct CrateInfo {
    max_stable_version: Option<String>,
    max_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrateResponse {
    #[serde(rename = "crate")]
    krate: CrateInfo,
}

/// Looks up the newest stable release of a crate on crates.io.
pub struct CratesIo {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl CratesIo {
    pub fn new(base_url: &str) -> Result<Self> {
        // crates.io rejects requests without a descriptive user agent
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
        let url = self.base_url.join(name)?;

        debug!("fetching crate metadata: {url}");

        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!("crate not found on crates.io: {name}");
            return Ok(None);
        }

        let doc: CrateResponse = response.error_for_status()?.json().await?;

        Ok(doc.krate.max_stable_version.or(doc.krate.max_version))
    }
}

#[async_trait]
impl VersionSource for CratesIo {
    async fn latest_version(&self, name: &str) -> Result<Option<String>> {
        self.retry
            .run("crates.io lookup", || self.fetch_latest(name))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[tokio::test]
    async fn prefers_max_stable_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/serde"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({
                    "crate": {
                        "max_stable_version": "1.0.219",
                        "max_version": "1.1.0-alpha.1"
                    }
                }),
            ))
            .mount(&server)
            .await;

        let registry = CratesIo::new(&format!("{}/", server.uri())).unwrap();

        assert_eq!(
            registry.latest_version("serde").await.unwrap(),
            Some("1.0.219".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_crate_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let registry = CratesIo::new(&format!("{}/", server.uri())).unwrap();

        assert_eq!(registry.latest_version("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn retries_after_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/serde"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/serde"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({
                    "crate": { "max_stable_version": "1.0.219", "max_version": "1.0.219" }
                }),
            ))
            .mount(&server)
            .await;

        let registry = CratesIo::new(&format!("{}/", server.uri()))
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_retries: 1,
                base_delay: std::time::Duration::ZERO,
            });

        assert_eq!(
            registry.latest_version("serde").await.unwrap(),
            Some("1.0.219".to_string())
        );
    }
}
