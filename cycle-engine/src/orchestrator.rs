use crate::credentials::{self, CredentialSource};
use crate::sources::{self, SourceRegistry};
use crate::timeframe;
use crate::types::{CollectSpec, CollectionOutcome, EngineError, Result, SourceSpec, SourceType};
use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Fans collection requests out to source adapters. Every call yields a
/// `CollectionOutcome`; nothing a single source does escapes as an error.
#[derive(Clone)]
pub struct CollectionOrchestrator {
    registry: Arc<SourceRegistry>,
    credentials: Arc<dyn CredentialSource>,
}

impl CollectionOrchestrator {
    pub fn new(registry: SourceRegistry, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            registry: Arc::new(registry),
            credentials,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Collects from one source.
    pub async fn collect(
        &self,
        source_type: &str,
        credential_ref: &str,
        collect_spec: &CollectSpec,
        days_back: u32,
    ) -> CollectionOutcome {
        let label = source_type
            .parse::<SourceType>()
            .map(|t| t.as_str().to_string())
            .unwrap_or_else(|_| source_type.to_string());

        let attempt = AssertUnwindSafe(self.try_collect(source_type, credential_ref, collect_spec, days_back))
            .catch_unwind()
            .await;

        match attempt {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("Collection from {} failed: {}", label, e);
                CollectionOutcome::failure(label, e.to_string())
            }
            Err(panic) => {
                let message = format!("Collection from {} panicked: {}", label, panic_message(panic.as_ref()));
                error!("{}", message);
                CollectionOutcome::failure(label, message)
            }
        }
    }

    async fn try_collect(
        &self,
        raw_type: &str,
        credential_ref: &str,
        collect_spec: &CollectSpec,
        days_back: u32,
    ) -> Result<CollectionOutcome> {
        let source_type: SourceType = raw_type.parse()?;
        let spec = timeframe::normalize(source_type, collect_spec, days_back);

        let adapter = self
            .registry
            .get(source_type)
            .ok_or_else(|| EngineError::UnsupportedSource {
                source_type: raw_type.to_string(),
            })?;

        let client = credentials::resolve(self.credentials.as_ref(), source_type, credential_ref)?;

        info!("Starting collection from {} via {}", source_type, adapter.source_name());
        let start_time = Instant::now();

        let batch = adapter
            .fetch(&client, &spec)
            .await
            .map_err(|e| EngineError::Adapter {
                source_type: source_type.to_string(),
                message: format!("{:#}", e),
            })?;

        let collection_time_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Collected {} items from {} in {}ms",
            batch.item_count, source_type, collection_time_ms
        );

        Ok(CollectionOutcome::Success {
            source_type,
            item_count: batch.item_count,
            payload: batch.payload,
            source_info: sources::source_info(source_type, &spec),
            collection_time_ms,
            collected_at: Utc::now(),
        })
    }

    /// Collects from every source concurrently, one task per source. All
    /// tasks run to completion and outcomes come back in input order.
    pub async fn collect_multiple(&self, sources: &[SourceSpec], days_back: u32) -> Vec<CollectionOutcome> {
        info!("Collecting from {} sources ({} days back)", sources.len(), days_back);

        let handles = sources.iter().map(|source| {
            let orchestrator = self.clone();
            let source = source.clone();
            tokio::spawn(async move {
                orchestrator
                    .collect(&source.source_type, &source.credential_ref, &source.collect_spec, days_back)
                    .await
            })
        });

        let joined = join_all(handles).await;

        let outcomes: Vec<CollectionOutcome> = joined
            .into_iter()
            .zip(sources)
            .map(|(result, source)| match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Collection task for {} aborted: {}", source.source_type, e);
                    CollectionOutcome::failure(
                        source.source_type.clone(),
                        format!("Collection task aborted: {}", e),
                    )
                }
            })
            .collect();

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            "Collection summary - {} succeeded, {} failed",
            succeeded,
            outcomes.len() - succeeded
        );
        for outcome in &outcomes {
            if let Some(message) = outcome.error_message() {
                debug!("Source {} failed: {}", outcome.source_type(), message);
            }
        }

        outcomes
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
