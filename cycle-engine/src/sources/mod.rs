pub mod gnews;
pub mod twitter;

pub use gnews::GNewsAdapter;
pub use twitter::TwitterAdapter;

use crate::config::HttpConfig;
use crate::types::{CollectSpec, Result, SourceAdapter, SourceType};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Fixed mapping from source type to the adapter that collects it.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<SourceType, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled HTTP adapters (GNews, Twitter).
    pub fn with_http_adapters(http: &HttpConfig) -> Result<Self> {
        let client = http.build_client()?;
        Ok(Self::new()
            .with(SourceType::Gnews, Arc::new(GNewsAdapter::new(client.clone())))
            .with(SourceType::Twitter, Arc::new(TwitterAdapter::new(client))))
    }

    pub fn register(&mut self, source_type: SourceType, adapter: Arc<dyn SourceAdapter>) {
        info!("Registering source adapter {} for {}", adapter.source_name(), source_type);
        self.adapters.insert(source_type, adapter);
    }

    pub fn with(mut self, source_type: SourceType, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.register(source_type, adapter);
        self
    }

    pub fn get(&self, source_type: SourceType) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&source_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<SourceType> {
        let mut types: Vec<_> = self.adapters.keys().copied().collect();
        types.sort();
        types
    }
}

impl SourceType {
    fn source_info_keys(&self) -> &'static [&'static str] {
        match self {
            SourceType::Reddit => &["subreddits", "sort"],
            SourceType::Youtube => &["channels", "max_videos"],
            SourceType::Telegram => &["channels"],
            SourceType::Twitter => &["query"],
            SourceType::Gnews => &["query", "language"],
            SourceType::Pytrends => &["keywords", "timeframe", "geo"],
        }
    }
}

/// Identifying fields of a collection, picked from the normalized spec.
pub fn source_info(source_type: SourceType, spec: &CollectSpec) -> serde_json::Map<String, Value> {
    source_type
        .source_info_keys()
        .iter()
        .filter_map(|key| spec.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect()
}

pub(crate) fn spec_str<'a>(spec: &'a CollectSpec, key: &str, default: &'a str) -> &'a str {
    spec.get(key).and_then(Value::as_str).unwrap_or(default)
}

pub(crate) fn spec_u64(spec: &CollectSpec, key: &str, default: u64) -> u64 {
    spec.get(key).and_then(Value::as_u64).unwrap_or(default)
}
