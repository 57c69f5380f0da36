use super::{spec_str, spec_u64};
use crate::types::{ClientConfig, CollectSpec, SourceAdapter, SourceBatch};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.twitter.com/2";

/// Recent-search endpoint of the Twitter v2 API. Accepts 10..=100 results.
pub struct TwitterAdapter {
    client: Client,
    base_url: String,
}

impl TwitterAdapter {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    public_metrics: Option<PublicMetrics>,
}

#[derive(Debug, Default, Deserialize)]
struct PublicMetrics {
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    retweet_count: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

fn tweets_from(response: SearchResponse) -> anyhow::Result<Vec<Value>> {
    // Partial errors come back alongside data; only fail when nothing came back.
    if response.data.is_empty() && !response.errors.is_empty() {
        let messages: Vec<String> = response
            .errors
            .iter()
            .map(|e| e.detail.clone().or_else(|| e.title.clone()).unwrap_or_default())
            .collect();
        bail!("Twitter API error: {}", messages.join("; "));
    }

    Ok(response
        .data
        .into_iter()
        .map(|tweet| {
            let metrics = tweet.public_metrics.unwrap_or_default();
            json!({
                "id": tweet.id,
                "text": tweet.text,
                "like_count": metrics.like_count,
                "retweet_count": metrics.retweet_count,
            })
        })
        .collect())
}

#[async_trait]
impl SourceAdapter for TwitterAdapter {
    fn source_name(&self) -> &'static str {
        "twitter-http"
    }

    async fn fetch(&self, client: &ClientConfig, spec: &CollectSpec) -> anyhow::Result<SourceBatch> {
        let token = client
            .get("bearer_token")
            .ok_or_else(|| anyhow!("Twitter client config has no bearer_token"))?;

        let query = spec_str(spec, "query", "");
        if query.trim().is_empty() {
            bail!("Twitter query must not be empty");
        }
        let max_results = spec_u64(spec, "max_results", 100).clamp(10, 100).to_string();

        let url = Url::parse_with_params(
            &format!("{}/tweets/search/recent", self.base_url.trim_end_matches('/')),
            &[
                ("query", query),
                ("max_results", max_results.as_str()),
                ("tweet.fields", "public_metrics,created_at"),
            ],
        )
        .context("invalid Twitter URL")?;

        debug!("Searching Twitter for '{}'", query);
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Twitter API error: HTTP {}: {}", status, body);
        }

        let body: SearchResponse = response.json().await?;
        Ok(SourceBatch::from_items(tweets_from(body)?))
    }
}
