//! HTTP client for the remote KV notify API.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};

use super::transport::{entries_after, FeedEntry, MapFeed, Watermark};
use super::FeedError;

/// Connection settings for [`HttpMapFeed`].
#[derive(Clone, Debug)]
pub struct HttpFeedConfig {
    /// API root, e.g. `https://app.redforester.com/api`.
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Timeout for ordinary requests.
    pub request_timeout: Duration,
    /// Extra time granted to long-poll requests on top of `request_timeout`.
    pub wait_timeout: Duration,
}

impl Default for HttpFeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://app.redforester.com/api".to_string(),
            username: None,
            password: None,
            request_timeout: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(60),
        }
    }
}

impl HttpFeedConfig {
    /// Read `MAPSTREAM_BASE_URL`, `MAPSTREAM_USERNAME` and `MAPSTREAM_PASSWORD`,
    /// keeping defaults for whatever is unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("MAPSTREAM_BASE_URL").unwrap_or(defaults.base_url),
            username: env::var("MAPSTREAM_USERNAME").ok(),
            password: env::var("MAPSTREAM_PASSWORD").ok(),
            ..defaults
        }
    }
}

/// [`MapFeed`] backed by the KV notify endpoints:
///
/// ```text
/// GET {base}/kv/partition/event:{map}/key/{prefix}/notify/last
/// GET {base}/kv/partition/event:{map}/key/{prefix}/notify/last?version={v}
/// GET {base}/kv/partition/event:{map}/key/{prefix}?from={offset}&limit={n}
/// ```
pub struct HttpMapFeed {
    client: reqwest::Client,
    base_url: Url,
    config: HttpFeedConfig,
}

impl HttpMapFeed {
    pub fn new(config: HttpFeedConfig) -> Result<Self, FeedError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| FeedError::InvalidConfig(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(FeedError::InvalidConfig(format!(
                "{} cannot be used as an API root",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("mapstream/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    fn stream_url(&self, map_id: &str, kv_prefix: &str, tail: &[&str]) -> Result<Url, FeedError> {
        let partition = format!("event:{}", map_id);
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FeedError::InvalidConfig(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(["kv", "partition", partition.as_str(), "key", kv_prefix])
            .extend(tail);
        Ok(url)
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.password.as_ref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, FeedError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl MapFeed for HttpMapFeed {
    async fn get_watermark(&self, map_id: &str, kv_prefix: &str) -> Result<Watermark, FeedError> {
        let url = self.stream_url(map_id, kv_prefix, &["notify", "last"])?;
        let response = self.send(self.get(url)).await?;
        Ok(response.json().await?)
    }

    async fn get_entries(
        &self,
        map_id: &str,
        kv_prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<FeedEntry>, FeedError> {
        // One extra entry in case the server treats `from` as inclusive.
        let requested = if after.is_some() { limit.saturating_add(1) } else { limit };
        let mut url = self.stream_url(map_id, kv_prefix, &[])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(after) = after {
                query.append_pair("from", after);
            }
            query.append_pair("limit", &requested.to_string());
        }
        let response = self.send(self.get(url)).await?;
        let received: Vec<FeedEntry> = response.json().await?;

        let count = received.len();
        let selected = entries_after(received, after, limit);
        if selected.len() < count {
            log::debug!(
                "[{}] Kept {} of {} fetched entries",
                map_id,
                selected.len(),
                count
            );
        }
        Ok(selected)
    }

    async fn wait_for_watermark_change(
        &self,
        map_id: &str,
        kv_prefix: &str,
        known_version: &str,
    ) -> Result<Option<Watermark>, FeedError> {
        let mut url = self.stream_url(map_id, kv_prefix, &["notify", "last"])?;
        url.query_pairs_mut().append_pair("version", known_version);

        let request = self
            .get(url)
            .timeout(self.config.request_timeout + self.config.wait_timeout);
        let response = self.send(request).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let watermark: Watermark = response.json().await?;
        if watermark.version == known_version {
            Ok(None)
        } else {
            Ok(Some(watermark))
        }
    }
}
