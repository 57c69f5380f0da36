use super::{spec_str, spec_u64};
use crate::types::{ClientConfig, CollectSpec, SourceAdapter, SourceBatch};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://gnews.io/api/v4";

/// News search through the GNews REST API.
pub struct GNewsAdapter {
    client: Client,
    base_url: String,
}

impl GNewsAdapter {
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
    articles: Vec<Article>,
    #[serde(default)]
    errors: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "publishedAt")]
    published_at: Option<String>,
    #[serde(default)]
    source: Option<ArticleSource>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    #[serde(default)]
    name: Option<String>,
}

fn articles_from(response: SearchResponse) -> anyhow::Result<Vec<Value>> {
    if let Some(errors) = response.errors {
        bail!("GNews API error: {}", errors);
    }

    Ok(response
        .articles
        .into_iter()
        .map(|article| {
            json!({
                "title": article.title,
                "description": article.description,
                "url": article.url,
                "source_name": article.source.and_then(|s| s.name),
                "published_at": article.published_at,
            })
        })
        .collect())
}

#[async_trait]
impl SourceAdapter for GNewsAdapter {
    fn source_name(&self) -> &'static str {
        "gnews-http"
    }

    async fn fetch(&self, client: &ClientConfig, spec: &CollectSpec) -> anyhow::Result<SourceBatch> {
        let api_key = client.get("api_key").ok_or_else(|| anyhow!("GNews client config has no api_key"))?;

        let query = spec_str(spec, "query", "");
        let language = spec_str(spec, "language", "en");
        let max_results = spec_u64(spec, "max_results", 10).to_string();
        let sort_by = spec_str(spec, "sort_by", "publishedAt");

        let url = Url::parse_with_params(
            &format!("{}/search", self.base_url.trim_end_matches('/')),
            &[
                ("q", query),
                ("lang", language),
                ("max", max_results.as_str()),
                ("sortby", sort_by),
                ("token", api_key.as_str()),
            ],
        )
        .context("invalid GNews URL")?;

        debug!("Searching GNews for '{}' ({})", query, language);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("GNews API error: HTTP {}: {}", status, body);
        }

        let body: SearchResponse = response.json().await?;
        Ok(SourceBatch::from_items(articles_from(body)?))
    }
}
