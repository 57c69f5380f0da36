mod common;

use async_trait::async_trait;
use common::*;
use cycle_engine::store::{CycleStore, InMemoryCycleStore};
use cycle_engine::types::*;
use cycle_engine::{CycleEngine, LlmAdapterRegistry, MockLlmAdapter, SourceRegistry};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// Generator that keeps every user prompt it receives.
#[derive(Default)]
struct CapturingGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl TextGenerator for CapturingGenerator {
    fn provider_name(&self) -> String {
        "capture".to_string()
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(request.user_prompt.clone());
        Ok("Executive Summary\nRust async posts dominated the day.".to_string())
    }
}

fn engine(registry: SourceRegistry, generators: LlmAdapterRegistry, store: Arc<dyn CycleStore>) -> CycleEngine {
    CycleEngine::new(orchestrator(registry), generators, store)
}

fn request(sources: Vec<SourceSpec>, provider: &str) -> CycleRequest {
    let mut request = CycleRequest::new(sources);
    request.llm_provider = provider.to_string();
    request
}

fn mixed_registry() -> SourceRegistry {
    SourceRegistry::new()
        .with(SourceType::Reddit, Arc::new(StaticItemsAdapter::new("alpha", 10)))
        .with(
            SourceType::Youtube,
            Arc::new(FailingAdapter {
                message: "quota exceeded",
                delay_ms: 0,
            }),
        )
}

#[tokio::test]
async fn test_partial_failure_still_completes() -> Result<()> {
    init_tracing();

    let generator = Arc::new(CapturingGenerator::default());
    let store = Arc::new(TransitionLog::default());
    let engine = engine(
        mixed_registry(),
        LlmAdapterRegistry::new().with(generator.clone()),
        store.clone(),
    );

    let cycle = engine
        .run_cycle(request(vec![source("reddit"), source("youtube")], "capture"))
        .await?;
    info!("Cycle {} finished as {}", cycle.id, cycle.status);

    assert_eq!(cycle.status, CycleStatus::Completed);
    assert_eq!(cycle.outcomes.len(), 2);
    assert_eq!(cycle.outcomes[0].item_count(), 10);
    assert!(!cycle.outcomes[1].is_success());
    assert_eq!(cycle.total_items(), 10);
    assert!(cycle.started_at.is_some() && cycle.completed_at.is_some());
    assert!(cycle.error_message.is_none());

    let summary = cycle.summary.as_ref().expect("completed cycle has a summary");
    assert!(!summary.text.is_empty());
    assert!(summary.cost_usd >= 0.0);
    assert_eq!(summary.provider, "capture");

    let prompts = generator.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("SOURCE: REDDIT"));
    assert!(prompts[0].contains("alpha post 0"));
    assert!(!prompts[0].contains("YOUTUBE"));
    assert!(!prompts[0].contains("quota exceeded"));

    assert_eq!(
        store.statuses(),
        vec![
            CycleStatus::Pending,
            CycleStatus::Collecting,
            CycleStatus::Summarizing,
            CycleStatus::Completed
        ]
    );

    let detail = engine.cycle_detail(cycle.id).await?;
    assert_eq!(detail.cycle.item_count, 10);
    assert_eq!(detail.collected.len(), 1);
    assert_eq!(detail.collected[0].source_name, "unknown");
    assert!(detail.summary.is_some());
    Ok(())
}

#[tokio::test]
async fn test_all_sources_failing_fails_cycle() -> Result<()> {
    init_tracing();

    let registry = SourceRegistry::new()
        .with(
            SourceType::Reddit,
            Arc::new(FailingAdapter {
                message: "forbidden",
                delay_ms: 0,
            }),
        )
        .with(
            SourceType::Youtube,
            Arc::new(FailingAdapter {
                message: "quota exceeded",
                delay_ms: 0,
            }),
        );
    let generator = Arc::new(CapturingGenerator::default());
    let store = Arc::new(TransitionLog::default());
    let engine = engine(registry, LlmAdapterRegistry::new().with(generator.clone()), store.clone());

    let cycle = engine
        .run_cycle(request(vec![source("reddit"), source("youtube")], "capture"))
        .await?;

    assert_eq!(cycle.status, CycleStatus::Failed);
    assert_eq!(cycle.total_items(), 0);
    assert!(cycle.summary.is_none());
    assert!(cycle.completed_at.is_some());
    let message = cycle.error_message.clone().unwrap_or_default();
    assert!(message.to_lowercase().contains("no data collected"));

    assert!(generator.prompts.lock().unwrap().is_empty());
    assert_eq!(
        store.statuses(),
        vec![CycleStatus::Pending, CycleStatus::Collecting, CycleStatus::Failed]
    );

    let detail = engine.cycle_detail(cycle.id).await?;
    assert!(detail.summary.is_none());
    assert!(detail.collected.is_empty());
    assert_eq!(detail.cycle.error_message, cycle.error_message);
    Ok(())
}

#[tokio::test]
async fn test_structured_payload_is_summarized() -> Result<()> {
    init_tracing();

    let registry = SourceRegistry::new().with(SourceType::Pytrends, Arc::new(TrendsAdapter));
    let generator = Arc::new(CapturingGenerator::default());
    let engine = engine(
        registry,
        LlmAdapterRegistry::new().with(generator.clone()),
        Arc::new(InMemoryCycleStore::new()),
    );

    let mut trends = source("pytrends");
    trends.collect_spec = spec(serde_json::json!({"keywords": ["rust"]}));
    let mut req = request(vec![trends], "capture");
    req.timeframe_days = 5;
    req.custom_prompt = Some("Focus on search interest.".to_string());

    let cycle = engine.run_cycle(req).await?;
    assert_eq!(cycle.status, CycleStatus::Completed);
    assert_eq!(cycle.total_items(), 12);

    let prompt = generator.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("SOURCE: PYTRENDS"));
    assert!(prompt.contains(r#"INFO: {"keywords":["rust"],"timeframe":"today 5-d"}"#));
    assert!(prompt.contains("Trend Data Points: 12"));
    assert!(prompt.contains("  2025-03-12: rust = 60"));
    assert!(!prompt.contains("2025-03-02"));
    assert!(prompt.contains("    - rust async (100)"));
    assert!(prompt.ends_with("\n\nAdditional Instructions:\nFocus on search interest."));
    Ok(())
}

#[tokio::test]
async fn test_empty_collections_fail_cycle() -> Result<()> {
    init_tracing();

    let registry = SourceRegistry::new().with(SourceType::Pytrends, Arc::new(StaticItemsAdapter::new("none", 0)));
    let engine = engine(
        registry,
        LlmAdapterRegistry::new().with(Arc::new(MockLlmAdapter::new("mock"))),
        Arc::new(InMemoryCycleStore::new()),
    );

    let cycle = engine.run_cycle(request(vec![source("pytrends")], "mock")).await?;
    assert_eq!(cycle.status, CycleStatus::Failed);
    assert!(cycle.outcomes[0].is_success());
    assert!(cycle.summary.is_none());
    Ok(())
}

#[tokio::test]
async fn test_generation_failure_fails_cycle() -> Result<()> {
    init_tracing();

    let registry = SourceRegistry::new().with(SourceType::Reddit, Arc::new(StaticItemsAdapter::new("beta", 3)));
    let store = Arc::new(TransitionLog::default());
    let engine = engine(
        registry,
        LlmAdapterRegistry::new().with(Arc::new(MockLlmAdapter::new("mock").failing("LLM backend unavailable"))),
        store.clone(),
    );

    let cycle = engine.run_cycle(request(vec![source("reddit")], "mock")).await?;

    assert_eq!(cycle.status, CycleStatus::Failed);
    assert_eq!(cycle.error_message.as_deref(), Some("LLM backend unavailable"));
    assert_eq!(cycle.total_items(), 3);
    assert!(cycle.summary.is_none());
    assert_eq!(
        store.statuses(),
        vec![
            CycleStatus::Pending,
            CycleStatus::Collecting,
            CycleStatus::Summarizing,
            CycleStatus::Failed
        ]
    );

    let detail = engine.cycle_detail(cycle.id).await?;
    assert!(detail.summary.is_none());
    assert_eq!(detail.collected.len(), 1);
    assert_eq!(detail.collected[0].item_count, 3);
    Ok(())
}

#[tokio::test]
async fn test_unknown_provider_fails_cycle() -> Result<()> {
    init_tracing();

    let registry = SourceRegistry::new().with(SourceType::Reddit, Arc::new(StaticItemsAdapter::new("gamma", 1)));
    let engine = engine(registry, LlmAdapterRegistry::new(), Arc::new(InMemoryCycleStore::new()));

    let cycle = engine.run_cycle(request(vec![source("reddit")], "mistral")).await?;
    assert_eq!(cycle.status, CycleStatus::Failed);
    assert_eq!(cycle.error_message.as_deref(), Some("Unsupported LLM provider: mistral"));
    Ok(())
}

#[tokio::test]
async fn test_summary_store_error_fails_cycle() -> Result<()> {
    init_tracing();

    let registry = SourceRegistry::new().with(SourceType::Reddit, Arc::new(StaticItemsAdapter::new("delta", 2)));
    let store = Arc::new(TransitionLog {
        fail_summary_insert: true,
        ..Default::default()
    });
    let engine = engine(
        registry,
        LlmAdapterRegistry::new().with(Arc::new(MockLlmAdapter::new("mock"))),
        store.clone(),
    );

    let cycle = engine.run_cycle(request(vec![source("reddit")], "mock")).await?;
    assert_eq!(cycle.status, CycleStatus::Failed);
    assert!(cycle.summary.is_none());
    assert_eq!(
        cycle.error_message.as_deref(),
        Some("Configuration error: summary table unavailable")
    );
    Ok(())
}

#[tokio::test]
async fn test_status_is_visible_mid_cycle() -> Result<()> {
    init_tracing();

    let registry = SourceRegistry::new().with(
        SourceType::Reddit,
        Arc::new(StaticItemsAdapter::new("slow", 2).with_delay(400)),
    );
    let store: Arc<dyn CycleStore> = Arc::new(InMemoryCycleStore::new());
    let engine = Arc::new(engine(
        registry,
        LlmAdapterRegistry::new().with(Arc::new(MockLlmAdapter::new("mock").with_delay(200))),
        store.clone(),
    ));

    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_cycle(request(vec![source("reddit")], "mock")).await })
    };

    let mut observed = Vec::new();
    for _ in 0..100 {
        let page = store.list_cycles(1, 10, None).await?;
        if let Some(view) = page.cycles.first() {
            if observed.last() != Some(&view.status) {
                observed.push(view.status);
            }
            if view.status.is_terminal() {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let cycle = runner.await.expect("cycle task panicked")?;
    assert_eq!(cycle.status, CycleStatus::Completed);
    assert!(observed.contains(&CycleStatus::Collecting));
    assert!(observed.contains(&CycleStatus::Summarizing));
    assert_eq!(observed.last(), Some(&CycleStatus::Completed));
    Ok(())
}

#[tokio::test]
async fn test_invalid_request_creates_nothing() -> Result<()> {
    init_tracing();

    let store: Arc<dyn CycleStore> = Arc::new(InMemoryCycleStore::new());
    let engine = engine(mixed_registry(), LlmAdapterRegistry::new(), store.clone());

    let mut bad = request(vec![source("reddit")], "mock");
    bad.timeframe_days = 8;
    assert!(matches!(engine.run_cycle(bad).await, Err(EngineError::InvalidRequest(_))));
    assert!(matches!(
        engine.run_cycle(request(vec![], "mock")).await,
        Err(EngineError::InvalidRequest(_))
    ));

    assert_eq!(store.list_cycles(1, 10, None).await?.total, 0);
    Ok(())
}

#[tokio::test]
async fn test_list_and_delete_cycles() -> Result<()> {
    init_tracing();

    let store: Arc<dyn CycleStore> = Arc::new(InMemoryCycleStore::new());
    let engine = engine(
        mixed_registry(),
        LlmAdapterRegistry::new().with(Arc::new(MockLlmAdapter::new("mock"))),
        store.clone(),
    );

    let first = engine.run_cycle(request(vec![source("reddit")], "mock")).await?;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = engine.run_cycle(request(vec![source("youtube")], "mock")).await?;
    assert_eq!(first.status, CycleStatus::Completed);
    assert_eq!(second.status, CycleStatus::Failed);

    let page = store.list_cycles(1, 1, None).await?;
    assert_eq!(page.total, 2);
    assert_eq!(page.cycles.len(), 1);
    assert_eq!(page.cycles[0].id, second.id);

    let completed = store.list_cycles(1, 10, Some(CycleStatus::Completed)).await?;
    assert_eq!(completed.total, 1);
    assert_eq!(completed.cycles[0].item_count, 10);
    assert!(completed.cycles[0].summary_text.is_some());

    engine.delete_cycle(first.id).await?;
    assert!(store.get_cycle(first.id).await?.is_none());
    assert!(matches!(
        engine.delete_cycle(first.id).await,
        Err(EngineError::CycleNotFound { .. })
    ));
    assert!(matches!(
        engine.cycle_detail(first.id).await,
        Err(EngineError::CycleNotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_detail_keeps_failed_source_outcomes() -> Result<()> {
    init_tracing();

    let engine = engine(
        mixed_registry(),
        LlmAdapterRegistry::new().with(Arc::new(MockLlmAdapter::new("mock"))),
        Arc::new(InMemoryCycleStore::new()),
    );

    let cycle = engine
        .run_cycle(request(vec![source("reddit"), source("youtube")], "mock"))
        .await?;
    assert_eq!(cycle.status, CycleStatus::Completed);

    let detail = engine.cycle_detail(cycle.id).await?;
    assert_eq!(detail.outcomes, cycle.outcomes);
    assert_eq!(detail.outcomes[0].item_count(), 10);
    assert_eq!(
        detail.outcomes[1].error_message(),
        Some("Failed to collect from youtube: quota exceeded")
    );
    // Only the successful source has a data row; the failure lives on the outcome.
    assert_eq!(detail.collected.len(), 1);
    Ok(())
}
