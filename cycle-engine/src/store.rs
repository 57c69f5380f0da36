use crate::types::{
    CollectSpec, CollectedDataRecord, CollectionOutcome, Cycle, CycleStatus, EngineError, Result, SourceConfig,
    SourceConfigUpdate, SourceSpec, SourceType, Summary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

pub const MAX_PAGE_SIZE: u32 = 100;

/// Cycle as listed: record fields plus the summary text and item total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleView {
    pub id: Uuid,
    pub name: Option<String>,
    pub status: CycleStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub summary_text: Option<String>,
    pub item_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleDetail {
    pub cycle: CycleView,
    pub sources: Vec<SourceSpec>,
    /// One per source in input order, failures included.
    pub outcomes: Vec<CollectionOutcome>,
    pub collected: Vec<CollectedDataRecord>,
    pub summary: Option<Summary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleListPage {
    pub cycles: Vec<CycleView>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Pages start at 1 and hold at most `MAX_PAGE_SIZE` cycles.
pub fn page_bounds(page: u32, page_size: u32) -> (u32, u32, u64) {
    let page = page.max(1);
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let offset = (page as u64 - 1) * page_size as u64;
    (page, page_size, offset)
}

/// Persistence for cycles, the collected data of successful sources,
/// summaries and saved source configs. Deleting a cycle removes its data and
/// summary with it.
#[async_trait]
pub trait CycleStore: Send + Sync {
    async fn insert_cycle(&self, cycle: &Cycle) -> Result<()>;

    /// Writes status, timestamps, error message and per-source outcomes.
    async fn update_cycle(&self, cycle: &Cycle) -> Result<()>;

    async fn insert_collected_data(&self, record: &CollectedDataRecord) -> Result<()>;

    async fn insert_summary(&self, cycle_id: Uuid, summary: &Summary) -> Result<()>;

    async fn get_cycle(&self, id: Uuid) -> Result<Option<CycleView>>;

    async fn get_cycle_detail(&self, id: Uuid) -> Result<Option<CycleDetail>>;

    /// Newest first, optionally filtered by status.
    async fn list_cycles(&self, page: u32, page_size: u32, status: Option<CycleStatus>) -> Result<CycleListPage>;

    /// Returns false when no such cycle exists.
    async fn delete_cycle(&self, id: Uuid) -> Result<bool>;

    async fn insert_source_config(&self, config: &SourceConfig) -> Result<()>;

    async fn get_source_config(&self, id: Uuid) -> Result<Option<SourceConfig>>;

    /// Oldest first, optionally filtered by type and enabled flag.
    async fn list_source_configs(
        &self,
        source_type: Option<SourceType>,
        enabled: Option<bool>,
    ) -> Result<Vec<SourceConfig>>;

    /// Returns the updated config, or `None` when it does not exist.
    async fn update_source_config(&self, id: Uuid, update: &SourceConfigUpdate) -> Result<Option<SourceConfig>>;

    async fn delete_source_config(&self, id: Uuid) -> Result<bool>;
}

struct StoredCycle {
    cycle: Cycle,
    collected: Vec<CollectedDataRecord>,
    summary: Option<Summary>,
}

impl StoredCycle {
    fn view(&self) -> CycleView {
        let cycle = &self.cycle;
        CycleView {
            id: cycle.id,
            name: cycle.name.clone(),
            status: cycle.status,
            created_at: cycle.created_at,
            started_at: cycle.started_at,
            completed_at: cycle.completed_at,
            error_message: cycle.error_message.clone(),
            summary_text: self.summary.as_ref().map(|s| s.text.clone()),
            item_count: self.collected.iter().map(|r| r.item_count).sum(),
        }
    }
}

#[derive(Default)]
pub struct InMemoryCycleStore {
    cycles: RwLock<HashMap<Uuid, StoredCycle>>,
    source_configs: RwLock<HashMap<Uuid, SourceConfig>>,
}

impl InMemoryCycleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CycleStore for InMemoryCycleStore {
    async fn insert_cycle(&self, cycle: &Cycle) -> Result<()> {
        let mut cycles = self.cycles.write().await;
        cycles.insert(
            cycle.id,
            StoredCycle {
                cycle: cycle.clone(),
                collected: Vec::new(),
                summary: None,
            },
        );
        Ok(())
    }

    async fn update_cycle(&self, cycle: &Cycle) -> Result<()> {
        let mut cycles = self.cycles.write().await;
        match cycles.get_mut(&cycle.id) {
            Some(stored) => {
                stored.cycle = cycle.clone();
                Ok(())
            }
            None => Err(EngineError::CycleNotFound { id: cycle.id }),
        }
    }

    async fn insert_collected_data(&self, record: &CollectedDataRecord) -> Result<()> {
        let mut cycles = self.cycles.write().await;
        let stored = cycles
            .get_mut(&record.cycle_id)
            .ok_or(EngineError::CycleNotFound { id: record.cycle_id })?;
        stored.collected.push(record.clone());
        Ok(())
    }

    async fn insert_summary(&self, cycle_id: Uuid, summary: &Summary) -> Result<()> {
        let mut cycles = self.cycles.write().await;
        let stored = cycles
            .get_mut(&cycle_id)
            .ok_or(EngineError::CycleNotFound { id: cycle_id })?;
        stored.summary = Some(summary.clone());
        Ok(())
    }

    async fn get_cycle(&self, id: Uuid) -> Result<Option<CycleView>> {
        let cycles = self.cycles.read().await;
        Ok(cycles.get(&id).map(StoredCycle::view))
    }

    async fn get_cycle_detail(&self, id: Uuid) -> Result<Option<CycleDetail>> {
        let cycles = self.cycles.read().await;
        Ok(cycles.get(&id).map(|stored| CycleDetail {
            cycle: stored.view(),
            sources: stored.cycle.sources.clone(),
            outcomes: stored.cycle.outcomes.clone(),
            collected: stored.collected.clone(),
            summary: stored.summary.clone(),
        }))
    }

    async fn list_cycles(&self, page: u32, page_size: u32, status: Option<CycleStatus>) -> Result<CycleListPage> {
        let (page, page_size, offset) = page_bounds(page, page_size);
        let cycles = self.cycles.read().await;

        let mut matching: Vec<&StoredCycle> = cycles
            .values()
            .filter(|stored| status.map_or(true, |s| stored.cycle.status == s))
            .collect();
        matching.sort_by(|a, b| {
            b.cycle
                .created_at
                .cmp(&a.cycle.created_at)
                .then_with(|| b.cycle.id.cmp(&a.cycle.id))
        });

        Ok(CycleListPage {
            total: matching.len() as u64,
            cycles: matching
                .into_iter()
                .skip(offset as usize)
                .take(page_size as usize)
                .map(StoredCycle::view)
                .collect(),
            page,
            page_size,
        })
    }

    async fn delete_cycle(&self, id: Uuid) -> Result<bool> {
        let mut cycles = self.cycles.write().await;
        Ok(cycles.remove(&id).is_some())
    }

    async fn insert_source_config(&self, config: &SourceConfig) -> Result<()> {
        let mut configs = self.source_configs.write().await;
        configs.insert(config.id, config.clone());
        Ok(())
    }

    async fn get_source_config(&self, id: Uuid) -> Result<Option<SourceConfig>> {
        let configs = self.source_configs.read().await;
        Ok(configs.get(&id).cloned())
    }

    async fn list_source_configs(
        &self,
        source_type: Option<SourceType>,
        enabled: Option<bool>,
    ) -> Result<Vec<SourceConfig>> {
        let configs = self.source_configs.read().await;
        let mut matching: Vec<SourceConfig> = configs
            .values()
            .filter(|c| source_type.map_or(true, |t| c.source_type == t))
            .filter(|c| enabled.map_or(true, |e| c.enabled == e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn update_source_config(&self, id: Uuid, update: &SourceConfigUpdate) -> Result<Option<SourceConfig>> {
        let mut configs = self.source_configs.write().await;
        let Some(config) = configs.get_mut(&id) else {
            return Ok(None);
        };
        let mut updated = config.clone();
        updated.apply(update)?;
        *config = updated.clone();
        Ok(Some(updated))
    }

    async fn delete_source_config(&self, id: Uuid) -> Result<bool> {
        let mut configs = self.source_configs.write().await;
        Ok(configs.remove(&id).is_some())
    }
}

pub struct PgCycleStore {
    db: PgPool,
}

impl PgCycleStore {
    /// Connects and applies the bundled migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&db).await?;
        info!("Connected to cycle database");
        Ok(Self { db })
    }

    pub fn from_pool(db: PgPool) -> Self {
        Self { db }
    }
}

const VIEW_COLUMNS: &str = r#"
    c.id, c.name, c.status, c.created_at, c.started_at, c.completed_at, c.error_message,
    s.summary_text,
    COALESCE((SELECT SUM(d.item_count) FROM collected_data d WHERE d.cycle_id = c.id), 0)::BIGINT AS item_count
"#;

fn view_from_row(row: &PgRow) -> Result<CycleView> {
    let status: String = row.try_get("status")?;
    let item_count: i64 = row.try_get("item_count")?;
    Ok(CycleView {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        error_message: row.try_get("error_message")?,
        summary_text: row.try_get("summary_text")?,
        item_count: item_count.max(0) as usize,
    })
}

fn collected_from_row(row: &PgRow) -> Result<CollectedDataRecord> {
    let data: Json<serde_json::Value> = row.try_get("data")?;
    let data_size_bytes: i64 = row.try_get("data_size_bytes")?;
    let item_count: i64 = row.try_get("item_count")?;
    let collection_time_ms: i64 = row.try_get("collection_time_ms")?;
    Ok(CollectedDataRecord {
        id: row.try_get("id")?,
        cycle_id: row.try_get("cycle_id")?,
        source_type: row.try_get("source_type")?,
        source_name: row.try_get("source_name")?,
        data: data.0,
        data_size_bytes: data_size_bytes.max(0) as usize,
        item_count: item_count.max(0) as usize,
        collection_time_ms: collection_time_ms.max(0) as u64,
        collected_at: row.try_get("collected_at")?,
    })
}

fn summary_from_row(row: &PgRow) -> Result<Summary> {
    let word_count: i64 = row.try_get("word_count")?;
    let input_tokens: i64 = row.try_get("input_tokens")?;
    let output_tokens: i64 = row.try_get("output_tokens")?;
    let generation_time_ms: i64 = row.try_get("generation_time_ms")?;
    Ok(Summary {
        text: row.try_get("summary_text")?,
        word_count: word_count.max(0) as usize,
        input_tokens: input_tokens.max(0) as u64,
        output_tokens: output_tokens.max(0) as u64,
        cost_usd: row.try_get("cost_usd")?,
        generation_time_ms: generation_time_ms.max(0) as u64,
        provider: row.try_get("llm_provider")?,
        model: row.try_get("model_name")?,
        pricing_warning: row.try_get("pricing_warning")?,
    })
}

fn source_config_from_row(row: &PgRow) -> Result<SourceConfig> {
    let source_type: String = row.try_get("source_type")?;
    let collect_spec: Json<CollectSpec> = row.try_get("collect_spec")?;
    Ok(SourceConfig {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        source_type: source_type.parse()?,
        credential_ref: row.try_get("credential_ref")?,
        collect_spec: collect_spec.0,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl CycleStore for PgCycleStore {
    async fn insert_cycle(&self, cycle: &Cycle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cycles
                (id, name, status, created_at, started_at, completed_at, error_message, sources, outcomes, config_snapshot)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(cycle.id)
        .bind(&cycle.name)
        .bind(cycle.status.as_str())
        .bind(cycle.created_at)
        .bind(cycle.started_at)
        .bind(cycle.completed_at)
        .bind(&cycle.error_message)
        .bind(Json(&cycle.sources))
        .bind(Json(&cycle.outcomes))
        .bind(Json(&cycle.config_snapshot))
        .execute(&self.db)
        .await?;

        debug!("Inserted cycle {}", cycle.id);
        Ok(())
    }

    async fn update_cycle(&self, cycle: &Cycle) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE cycles
            SET status = $2, started_at = $3, completed_at = $4, error_message = $5, outcomes = $6
            WHERE id = $1
            "#,
        )
        .bind(cycle.id)
        .bind(cycle.status.as_str())
        .bind(cycle.started_at)
        .bind(cycle.completed_at)
        .bind(&cycle.error_message)
        .bind(Json(&cycle.outcomes))
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::CycleNotFound { id: cycle.id });
        }
        debug!("Cycle {} is now {}", cycle.id, cycle.status);
        Ok(())
    }

    async fn insert_collected_data(&self, record: &CollectedDataRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collected_data
                (id, cycle_id, source_type, source_name, data, data_size_bytes, item_count, collection_time_ms, collected_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.cycle_id)
        .bind(&record.source_type)
        .bind(&record.source_name)
        .bind(Json(&record.data))
        .bind(record.data_size_bytes as i64)
        .bind(record.item_count as i64)
        .bind(record.collection_time_ms as i64)
        .bind(record.collected_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn insert_summary(&self, cycle_id: Uuid, summary: &Summary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO summaries
                (id, cycle_id, summary_text, word_count, input_tokens, output_tokens, cost_usd,
                 generation_time_ms, llm_provider, model_name, pricing_warning, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(cycle_id)
        .bind(&summary.text)
        .bind(summary.word_count as i64)
        .bind(summary.input_tokens as i64)
        .bind(summary.output_tokens as i64)
        .bind(summary.cost_usd)
        .bind(summary.generation_time_ms as i64)
        .bind(&summary.provider)
        .bind(&summary.model)
        .bind(&summary.pricing_warning)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get_cycle(&self, id: Uuid) -> Result<Option<CycleView>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM cycles c LEFT JOIN summaries s ON s.cycle_id = c.id WHERE c.id = $1",
            VIEW_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(view_from_row).transpose()
    }

    async fn get_cycle_detail(&self, id: Uuid) -> Result<Option<CycleDetail>> {
        let Some(cycle) = self.get_cycle(id).await? else {
            return Ok(None);
        };

        let row = sqlx::query("SELECT sources, outcomes FROM cycles WHERE id = $1")
            .bind(id)
            .fetch_one(&self.db)
            .await?;
        let sources: Json<Vec<SourceSpec>> = row.try_get("sources")?;
        let outcomes: Json<Vec<CollectionOutcome>> = row.try_get("outcomes")?;

        let collected = sqlx::query("SELECT * FROM collected_data WHERE cycle_id = $1 ORDER BY collected_at ASC")
            .bind(id)
            .fetch_all(&self.db)
            .await?
            .iter()
            .map(collected_from_row)
            .collect::<Result<Vec<_>>>()?;

        let summary = sqlx::query("SELECT * FROM summaries WHERE cycle_id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .as_ref()
            .map(summary_from_row)
            .transpose()?;

        Ok(Some(CycleDetail {
            cycle,
            sources: sources.0,
            outcomes: outcomes.0,
            collected,
            summary,
        }))
    }

    async fn list_cycles(&self, page: u32, page_size: u32, status: Option<CycleStatus>) -> Result<CycleListPage> {
        let (page, page_size, offset) = page_bounds(page, page_size);
        let status = status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cycles WHERE ($1::TEXT IS NULL OR status = $1)")
            .bind(status)
            .fetch_one(&self.db)
            .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM cycles c
            LEFT JOIN summaries s ON s.cycle_id = c.id
            WHERE ($1::TEXT IS NULL OR c.status = $1)
            ORDER BY c.created_at DESC, c.id DESC
            LIMIT $2 OFFSET $3
            "#,
            VIEW_COLUMNS
        ))
        .bind(status)
        .bind(page_size as i64)
        .bind(offset as i64)
        .fetch_all(&self.db)
        .await?;

        Ok(CycleListPage {
            cycles: rows.iter().map(view_from_row).collect::<Result<Vec<_>>>()?,
            total: total.max(0) as u64,
            page,
            page_size,
        })
    }

    async fn delete_cycle(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cycles WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_source_config(&self, config: &SourceConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO source_configs
                (id, name, source_type, credential_ref, collect_spec, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(config.id)
        .bind(&config.name)
        .bind(config.source_type.as_str())
        .bind(&config.credential_ref)
        .bind(Json(&config.collect_spec))
        .bind(config.enabled)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&self.db)
        .await?;

        debug!("Inserted source config {} ({})", config.id, config.source_type);
        Ok(())
    }

    async fn get_source_config(&self, id: Uuid) -> Result<Option<SourceConfig>> {
        let row = sqlx::query("SELECT * FROM source_configs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.as_ref().map(source_config_from_row).transpose()
    }

    async fn list_source_configs(
        &self,
        source_type: Option<SourceType>,
        enabled: Option<bool>,
    ) -> Result<Vec<SourceConfig>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM source_configs
            WHERE ($1::TEXT IS NULL OR source_type = $1)
              AND ($2::BOOLEAN IS NULL OR enabled = $2)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(source_type.map(|t| t.as_str()))
        .bind(enabled)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(source_config_from_row).collect()
    }

    async fn update_source_config(&self, id: Uuid, update: &SourceConfigUpdate) -> Result<Option<SourceConfig>> {
        let mut tx = self.db.begin().await?;
        let Some(row) = sqlx::query("SELECT * FROM source_configs WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let mut config = source_config_from_row(&row)?;
        config.apply(update)?;

        sqlx::query(
            r#"
            UPDATE source_configs
            SET name = $2, credential_ref = $3, collect_spec = $4, enabled = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(config.id)
        .bind(&config.name)
        .bind(&config.credential_ref)
        .bind(Json(&config.collect_spec))
        .bind(config.enabled)
        .bind(config.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!("Updated source config {}", id);
        Ok(Some(config))
    }

    async fn delete_source_config(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM source_configs WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
