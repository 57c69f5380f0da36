use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What to collect from a source, as configured by the user. Keys are
/// source-type specific (`subreddits`, `channels`, `query`, ...).
pub type CollectSpec = serde_json::Map<String, Value>;

/// Credentials and client settings resolved for one source, keyed by field
/// name (`client_id`, `bearer_token`, ...).
pub type ClientConfig = BTreeMap<String, String>;

/// Raw items returned by one adapter call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBatch {
    pub payload: Value,
    pub item_count: usize,
}

impl SourceBatch {
    pub fn from_items(items: Vec<Value>) -> Self {
        let item_count = items.len();
        Self {
            payload: Value::Array(items),
            item_count,
        }
    }

    /// For sources whose payload is not a plain list (time series etc.).
    pub fn structured(payload: Value, item_count: usize) -> Self {
        Self {
            payload,
            item_count,
        }
    }
}

// Object style note:
// Adapters and generators are treated as side-effect free by the caller.
// They get no retries and no caching from the engine, and any error they
// return is reported against the source or cycle that invoked them.

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_name(&self) -> &'static str;
    async fn fetch(&self, client: &ClientConfig, spec: &CollectSpec) -> anyhow::Result<SourceBatch>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn provider_name(&self) -> String;
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String>;
}
