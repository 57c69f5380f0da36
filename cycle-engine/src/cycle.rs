use crate::aggregator;
use crate::config::GenerationConfig;
use crate::llm_adapter::LlmAdapterRegistry;
use crate::orchestrator::CollectionOrchestrator;
use crate::pricing::PricingTable;
use crate::store::{CycleDetail, CycleStore};
use crate::summary::SummaryGenerator;
use crate::types::{
    CollectedDataRecord, CollectionOutcome, Cycle, CycleRequest, CycleStatus, EngineError, Result, SourceConfig,
    SourceConfigUpdate, SourceSpec, SourceType, Summary,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

impl Cycle {
    fn transition(&mut self, next: CycleStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start_collecting(&mut self) -> Result<()> {
        self.transition(CycleStatus::Collecting)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Outcomes can only be attached while collecting.
    pub fn record_outcomes(&mut self, outcomes: Vec<CollectionOutcome>) -> Result<()> {
        if self.status != CycleStatus::Collecting {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to: CycleStatus::Summarizing,
            });
        }
        self.outcomes = outcomes;
        Ok(())
    }

    pub fn begin_summarizing(&mut self) -> Result<()> {
        self.transition(CycleStatus::Summarizing)
    }

    pub fn complete(&mut self, summary: Summary) -> Result<()> {
        self.transition(CycleStatus::Completed)?;
        self.completed_at = Some(Utc::now());
        self.summary = Some(summary);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(CycleStatus::Failed)?;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(message.into());
        Ok(())
    }
}

/// Runs cycles end to end: collect, aggregate, summarize, with the cycle
/// committed to the store at every status change.
pub struct CycleEngine {
    orchestrator: CollectionOrchestrator,
    generators: LlmAdapterRegistry,
    pricing: Arc<PricingTable>,
    generation: GenerationConfig,
    store: Arc<dyn CycleStore>,
}

impl CycleEngine {
    pub fn new(orchestrator: CollectionOrchestrator, generators: LlmAdapterRegistry, store: Arc<dyn CycleStore>) -> Self {
        Self {
            orchestrator,
            generators,
            pricing: Arc::new(PricingTable::default()),
            generation: GenerationConfig::default(),
            store,
        }
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = Arc::new(pricing);
        self
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn store(&self) -> &Arc<dyn CycleStore> {
        &self.store
    }

    /// Validates the request and runs one cycle to a terminal state. Errors
    /// are returned only for invalid requests or when the cycle cannot be
    /// created; every later failure is recorded on the returned cycle.
    pub async fn run_cycle(&self, request: CycleRequest) -> Result<Cycle> {
        request.validate()?;
        let sources = self.resolve_sources(&request).await?;

        let snapshot = json!({
            "timeframe_days": request.timeframe_days,
            "llm_provider": request.llm_provider,
            "llm_model": request.llm_model,
            "custom_prompt": request.custom_prompt,
            "source_config_ids": request.source_config_ids,
        });
        let mut cycle = Cycle::new(request.name.clone(), sources, snapshot);
        self.store.insert_cycle(&cycle).await?;
        info!(
            "Created cycle {} with {} sources ({} days back)",
            cycle.id,
            cycle.sources.len(),
            request.timeframe_days
        );

        if let Err(e) = self.drive(&mut cycle, &request).await {
            error!("Cycle {} failed: {}", cycle.id, e);
            if let Err(transition) = cycle.fail(e.to_string()) {
                error!("Cycle {} could not be marked failed: {}", cycle.id, transition);
            }
        }

        if let Err(e) = self.store.update_cycle(&cycle).await {
            error!("Failed to commit terminal state of cycle {}: {}", cycle.id, e);
        }

        info!(
            "Cycle {} finished as {} ({} succeeded, {} failed, {} items)",
            cycle.id,
            cycle.status,
            cycle.succeeded_sources(),
            cycle.failed_sources(),
            cycle.total_items()
        );
        Ok(cycle)
    }

    /// Inline sources followed by the referenced saved configs. Every
    /// reference must exist and be enabled.
    async fn resolve_sources(&self, request: &CycleRequest) -> Result<Vec<SourceSpec>> {
        let mut sources = request.sources.clone();
        for id in &request.source_config_ids {
            let config = self
                .store
                .get_source_config(*id)
                .await?
                .ok_or(EngineError::SourceConfigNotFound { id: *id })?;
            if !config.enabled {
                return Err(EngineError::SourceConfigDisabled { id: *id });
            }
            sources.push(config.to_source_spec());
        }
        Ok(sources)
    }

    async fn drive(&self, cycle: &mut Cycle, request: &CycleRequest) -> Result<()> {
        cycle.start_collecting()?;
        self.store.update_cycle(cycle).await?;

        let outcomes = self
            .orchestrator
            .collect_multiple(&cycle.sources, request.timeframe_days)
            .await;
        cycle.record_outcomes(outcomes)?;

        for record in cycle
            .outcomes
            .iter()
            .filter_map(|outcome| CollectedDataRecord::from_outcome(cycle.id, outcome))
        {
            self.store.insert_collected_data(&record).await?;
        }

        if cycle.total_items() == 0 {
            warn!("Cycle {} collected no items", cycle.id);
            return Err(EngineError::NoDataCollected);
        }

        cycle.begin_summarizing()?;
        self.store.update_cycle(cycle).await?;

        let aggregated = aggregator::aggregate(&cycle.outcomes);
        let generator = self
            .generators
            .get_adapter(&request.llm_provider)
            .ok_or_else(|| EngineError::Summarization(format!("Unsupported LLM provider: {}", request.llm_provider)))?;
        let summary = SummaryGenerator::new(
            generator,
            request.llm_model.clone(),
            Arc::clone(&self.pricing),
            self.generation.clone(),
        )
        .summarize(&aggregated, request.custom_prompt.as_deref())
        .await?;

        self.store.insert_summary(cycle.id, &summary).await?;
        cycle.complete(summary)
    }

    pub async fn cycle_detail(&self, id: Uuid) -> Result<CycleDetail> {
        self.store
            .get_cycle_detail(id)
            .await?
            .ok_or(EngineError::CycleNotFound { id })
    }

    pub async fn delete_cycle(&self, id: Uuid) -> Result<()> {
        if self.store.delete_cycle(id).await? {
            info!("Deleted cycle {}", id);
            Ok(())
        } else {
            Err(EngineError::CycleNotFound { id })
        }
    }

    pub async fn create_source_config(&self, config: SourceConfig) -> Result<SourceConfig> {
        info!("Creating source config: {} ({})", config.name, config.source_type);
        self.store.insert_source_config(&config).await?;
        Ok(config)
    }

    pub async fn source_config(&self, id: Uuid) -> Result<SourceConfig> {
        self.store
            .get_source_config(id)
            .await?
            .ok_or(EngineError::SourceConfigNotFound { id })
    }

    pub async fn list_source_configs(
        &self,
        source_type: Option<SourceType>,
        enabled: Option<bool>,
    ) -> Result<Vec<SourceConfig>> {
        self.store.list_source_configs(source_type, enabled).await
    }

    pub async fn update_source_config(&self, id: Uuid, update: SourceConfigUpdate) -> Result<SourceConfig> {
        let config = self
            .store
            .update_source_config(id, &update)
            .await?
            .ok_or(EngineError::SourceConfigNotFound { id })?;
        info!("Updated source config {}", id);
        Ok(config)
    }

    pub async fn delete_source_config(&self, id: Uuid) -> Result<()> {
        if self.store.delete_source_config(id).await? {
            info!("Deleted source config {}", id);
            Ok(())
        } else {
            Err(EngineError::SourceConfigNotFound { id })
        }
    }
}
