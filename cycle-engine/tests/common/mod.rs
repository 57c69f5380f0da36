#![allow(dead_code)]

use async_trait::async_trait;
use cycle_engine::store::{CycleDetail, CycleListPage, CycleStore, CycleView, InMemoryCycleStore};
use cycle_engine::types::*;
use cycle_engine::{CollectionOrchestrator, SourceRegistry, StaticCredentials};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

pub fn spec(value: Value) -> CollectSpec {
    value.as_object().cloned().unwrap_or_default()
}

/// Returns `count` reddit-shaped posts after an optional delay.
pub struct StaticItemsAdapter {
    pub label: &'static str,
    pub count: usize,
    pub delay_ms: u64,
}

impl StaticItemsAdapter {
    pub fn new(label: &'static str, count: usize) -> Self {
        Self {
            label,
            count,
            delay_ms: 0,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[async_trait]
impl SourceAdapter for StaticItemsAdapter {
    fn source_name(&self) -> &'static str {
        "static-items"
    }

    async fn fetch(&self, _client: &ClientConfig, _spec: &CollectSpec) -> anyhow::Result<SourceBatch> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        let items = (0..self.count)
            .map(|i| {
                json!({
                    "title": format!("{} post {}", self.label, i),
                    "subreddit": self.label,
                    "channel": self.label,
                    "score": i,
                    "num_comments": 0,
                })
            })
            .collect();
        Ok(SourceBatch::from_items(items))
    }
}

pub struct FailingAdapter {
    pub message: &'static str,
    pub delay_ms: u64,
}

#[async_trait]
impl SourceAdapter for FailingAdapter {
    fn source_name(&self) -> &'static str {
        "failing"
    }

    async fn fetch(&self, _client: &ClientConfig, _spec: &CollectSpec) -> anyhow::Result<SourceBatch> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        anyhow::bail!("{}", self.message)
    }
}

pub struct PanickingAdapter;

#[async_trait]
impl SourceAdapter for PanickingAdapter {
    fn source_name(&self) -> &'static str {
        "panicking"
    }

    async fn fetch(&self, _client: &ClientConfig, _spec: &CollectSpec) -> anyhow::Result<SourceBatch> {
        panic!("adapter exploded")
    }
}

/// Returns a trends-shaped structured payload built from the normalized spec.
pub struct TrendsAdapter;

#[async_trait]
impl SourceAdapter for TrendsAdapter {
    fn source_name(&self) -> &'static str {
        "trends"
    }

    async fn fetch(&self, _client: &ClientConfig, spec: &CollectSpec) -> anyhow::Result<SourceBatch> {
        let timeframe = spec.get("timeframe").cloned().unwrap_or(Value::Null);
        let points: Vec<Value> = (1..=12)
            .map(|day| json!({"date": format!("2025-03-{:02}", day), "keyword": "rust", "interest": day * 5}))
            .collect();
        let count = points.len();
        Ok(SourceBatch::structured(
            json!({
                "interest_over_time": points,
                "related_queries_top": {"rust": [{"query": "rust async", "value": 100}]},
                "timeframe": timeframe,
            }),
            count,
        ))
    }
}

/// Records every spec it is handed and returns one item.
#[derive(Default)]
pub struct RecordingAdapter {
    pub seen: Mutex<Vec<CollectSpec>>,
}

#[async_trait]
impl SourceAdapter for RecordingAdapter {
    fn source_name(&self) -> &'static str {
        "recording"
    }

    async fn fetch(&self, _client: &ClientConfig, spec: &CollectSpec) -> anyhow::Result<SourceBatch> {
        self.seen.lock().unwrap().push(spec.clone());
        Ok(SourceBatch::from_items(vec![json!({"title": "seen"})]))
    }
}

pub fn reddit_credentials() -> Arc<StaticCredentials> {
    Arc::new(
        StaticCredentials::new()
            .with("REDDIT_CLIENT_ID", "id")
            .with("REDDIT_CLIENT_SECRET", "secret"),
    )
}

pub fn orchestrator(registry: SourceRegistry) -> CollectionOrchestrator {
    CollectionOrchestrator::new(registry, reddit_credentials())
}

pub fn source(source_type: &str) -> SourceSpec {
    let credential_ref = if source_type == "reddit" { "REDDIT" } else { "" };
    SourceSpec::new(source_type, credential_ref, CollectSpec::new())
}

/// In-memory store that also records the status of every committed update.
#[derive(Default)]
pub struct TransitionLog {
    pub inner: InMemoryCycleStore,
    pub statuses: Mutex<Vec<CycleStatus>>,
    pub fail_summary_insert: bool,
}

impl TransitionLog {
    pub fn statuses(&self) -> Vec<CycleStatus> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl CycleStore for TransitionLog {
    async fn insert_cycle(&self, cycle: &Cycle) -> Result<()> {
        self.statuses.lock().unwrap().push(cycle.status);
        self.inner.insert_cycle(cycle).await
    }

    async fn update_cycle(&self, cycle: &Cycle) -> Result<()> {
        self.statuses.lock().unwrap().push(cycle.status);
        self.inner.update_cycle(cycle).await
    }

    async fn insert_collected_data(&self, record: &CollectedDataRecord) -> Result<()> {
        self.inner.insert_collected_data(record).await
    }

    async fn insert_summary(&self, cycle_id: Uuid, summary: &Summary) -> Result<()> {
        if self.fail_summary_insert {
            return Err(EngineError::Config("summary table unavailable".into()));
        }
        self.inner.insert_summary(cycle_id, summary).await
    }

    async fn get_cycle(&self, id: Uuid) -> Result<Option<CycleView>> {
        self.inner.get_cycle(id).await
    }

    async fn get_cycle_detail(&self, id: Uuid) -> Result<Option<CycleDetail>> {
        self.inner.get_cycle_detail(id).await
    }

    async fn list_cycles(&self, page: u32, page_size: u32, status: Option<CycleStatus>) -> Result<CycleListPage> {
        self.inner.list_cycles(page, page_size, status).await
    }

    async fn delete_cycle(&self, id: Uuid) -> Result<bool> {
        self.inner.delete_cycle(id).await
    }

    async fn insert_source_config(&self, config: &SourceConfig) -> Result<()> {
        self.inner.insert_source_config(config).await
    }

    async fn get_source_config(&self, id: Uuid) -> Result<Option<SourceConfig>> {
        self.inner.get_source_config(id).await
    }

    async fn list_source_configs(
        &self,
        source_type: Option<SourceType>,
        enabled: Option<bool>,
    ) -> Result<Vec<SourceConfig>> {
        self.inner.list_source_configs(source_type, enabled).await
    }

    async fn update_source_config(&self, id: Uuid, update: &SourceConfigUpdate) -> Result<Option<SourceConfig>> {
        self.inner.update_source_config(id, update).await
    }

    async fn delete_source_config(&self, id: Uuid) -> Result<bool> {
        self.inner.delete_source_config(id).await
    }
}
