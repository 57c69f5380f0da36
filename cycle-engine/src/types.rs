use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub use interfaces::defs::{ClientConfig, CollectSpec, GenerationRequest, SourceAdapter, SourceBatch, TextGenerator};

/// Closed set of source types the engine knows how to collect from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Reddit,
    Youtube,
    Telegram,
    Twitter,
    Gnews,
    Pytrends,
}

impl SourceType {
    pub const ALL: [SourceType; 6] = [
        SourceType::Reddit,
        SourceType::Youtube,
        SourceType::Telegram,
        SourceType::Twitter,
        SourceType::Gnews,
        SourceType::Pytrends,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Reddit => "reddit",
            SourceType::Youtube => "youtube",
            SourceType::Telegram => "telegram",
            SourceType::Twitter => "twitter",
            SourceType::Gnews => "gnews",
            SourceType::Pytrends => "pytrends",
        }
    }

    /// Human-readable name used in diagnostics.
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceType::Reddit => "Reddit",
            SourceType::Youtube => "YouTube",
            SourceType::Telegram => "Telegram",
            SourceType::Twitter => "Twitter",
            SourceType::Gnews => "GNews",
            SourceType::Pytrends => "PyTrends",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        SourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| EngineError::UnsupportedSource {
                source_type: s.to_string(),
            })
    }
}

/// One configured source within a cycle. The tag is kept as a raw string so
/// that an unknown type surfaces as a failed outcome rather than a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub source_type: String,
    pub credential_ref: String,
    #[serde(default)]
    pub collect_spec: CollectSpec,
}

impl SourceSpec {
    pub fn new(source_type: impl Into<String>, credential_ref: impl Into<String>, collect_spec: CollectSpec) -> Self {
        Self {
            source_type: source_type.into(),
            credential_ref: credential_ref.into(),
            collect_spec,
        }
    }
}

/// A saved, reusable source definition. Holds a credential reference, never
/// the credential itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: Uuid,
    pub name: String,
    pub source_type: SourceType,
    pub credential_ref: String,
    #[serde(default)]
    pub collect_spec: CollectSpec,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourceConfig {
    pub fn new(
        name: impl Into<String>,
        source_type: SourceType,
        credential_ref: impl Into<String>,
        collect_spec: CollectSpec,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EngineError::InvalidRequest("Source config name must not be empty".to_string()));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            source_type,
            credential_ref: credential_ref.into(),
            collect_spec,
            enabled: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Applies the fields present in `update` and bumps `updated_at`.
    pub fn apply(&mut self, update: &SourceConfigUpdate) -> Result<()> {
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(EngineError::InvalidRequest("Source config name must not be empty".to_string()));
            }
            self.name = name.clone();
        }
        if let Some(credential_ref) = &update.credential_ref {
            self.credential_ref = credential_ref.clone();
        }
        if let Some(collect_spec) = &update.collect_spec {
            self.collect_spec = collect_spec.clone();
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn to_source_spec(&self) -> SourceSpec {
        SourceSpec::new(self.source_type.as_str(), self.credential_ref.clone(), self.collect_spec.clone())
    }
}

/// Partial update of a saved source; `None` leaves a field unchanged.
/// The source type is fixed once saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfigUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub credential_ref: Option<String>,
    #[serde(default)]
    pub collect_spec: Option<CollectSpec>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl SourceConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.credential_ref.is_none() && self.collect_spec.is_none() && self.enabled.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollectionOutcome {
    Success {
        source_type: SourceType,
        item_count: usize,
        payload: Value,
        source_info: serde_json::Map<String, Value>,
        collection_time_ms: u64,
        collected_at: DateTime<Utc>,
    },
    Failure {
        source_type: String,
        error_message: String,
    },
}

impl CollectionOutcome {
    pub fn failure(source_type: impl Into<String>, error_message: impl Into<String>) -> Self {
        CollectionOutcome::Failure {
            source_type: source_type.into(),
            error_message: error_message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CollectionOutcome::Success { .. })
    }

    pub fn source_type(&self) -> &str {
        match self {
            CollectionOutcome::Success { source_type, .. } => source_type.as_str(),
            CollectionOutcome::Failure { source_type, .. } => source_type,
        }
    }

    /// Items contributed to the cycle; failures contribute nothing.
    pub fn item_count(&self) -> usize {
        match self {
            CollectionOutcome::Success { item_count, .. } => *item_count,
            CollectionOutcome::Failure { .. } => 0,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            CollectionOutcome::Success { .. } => None,
            CollectionOutcome::Failure { error_message, .. } => Some(error_message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Pending,
    Collecting,
    Summarizing,
    Completed,
    Failed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Pending => "pending",
            CycleStatus::Collecting => "collecting",
            CycleStatus::Summarizing => "summarizing",
            CycleStatus::Completed => "completed",
            CycleStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleStatus::Completed | CycleStatus::Failed)
    }

    /// Legal edges of the cycle lifecycle.
    pub fn can_transition_to(&self, next: CycleStatus) -> bool {
        use CycleStatus::*;
        matches!(
            (self, next),
            (Pending, Collecting)
                | (Collecting, Summarizing)
                | (Collecting, Failed)
                | (Summarizing, Completed)
                | (Summarizing, Failed)
        )
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CycleStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(CycleStatus::Pending),
            "collecting" => Ok(CycleStatus::Collecting),
            "summarizing" => Ok(CycleStatus::Summarizing),
            "completed" => Ok(CycleStatus::Completed),
            "failed" => Ok(CycleStatus::Failed),
            other => Err(EngineError::InvalidRequest(format!("Unknown cycle status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    pub word_count: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub generation_time_ms: u64,
    pub provider: String,
    pub model: String,
    /// Set when the model has no price and `cost_usd` is a placeholder 0.
    #[serde(default)]
    pub pricing_warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub id: Uuid,
    pub name: Option<String>,
    pub status: CycleStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub sources: Vec<SourceSpec>,
    pub outcomes: Vec<CollectionOutcome>,
    pub summary: Option<Summary>,
    pub config_snapshot: Value,
}

impl Cycle {
    pub fn new(name: Option<String>, sources: Vec<SourceSpec>, config_snapshot: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            status: CycleStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            sources,
            outcomes: Vec::new(),
            summary: None,
            config_snapshot,
        }
    }

    pub fn total_items(&self) -> usize {
        self.outcomes.iter().map(CollectionOutcome::item_count).sum()
    }

    pub fn succeeded_sources(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed_sources(&self) -> usize {
        self.outcomes.len() - self.succeeded_sources()
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeframe_days() -> u32 {
    1
}

/// Inbound request that triggers one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    /// Saved source configs to run after the inline sources, in this order.
    #[serde(default)]
    pub source_config_ids: Vec<Uuid>,
    #[serde(default = "default_timeframe_days")]
    pub timeframe_days: u32,
    #[serde(default = "default_provider")]
    pub llm_provider: String,
    #[serde(default = "default_model")]
    pub llm_model: String,
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

impl CycleRequest {
    pub fn new(sources: Vec<SourceSpec>) -> Self {
        Self {
            name: None,
            sources,
            source_config_ids: Vec::new(),
            timeframe_days: default_timeframe_days(),
            llm_provider: default_provider(),
            llm_model: default_model(),
            custom_prompt: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=7).contains(&self.timeframe_days) {
            return Err(EngineError::InvalidRequest(format!(
                "timeframe_days must be between 1 and 7, got {}",
                self.timeframe_days
            )));
        }
        if self.sources.is_empty() && self.source_config_ids.is_empty() {
            return Err(EngineError::InvalidRequest("At least one source is required".to_string()));
        }
        Ok(())
    }
}

/// Stored row for one successful source outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedDataRecord {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub source_type: String,
    pub source_name: String,
    pub data: Value,
    pub data_size_bytes: usize,
    pub item_count: usize,
    pub collection_time_ms: u64,
    pub collected_at: DateTime<Utc>,
}

impl CollectedDataRecord {
    /// Returns `None` for failed outcomes; those are never persisted as data.
    pub fn from_outcome(cycle_id: Uuid, outcome: &CollectionOutcome) -> Option<Self> {
        match outcome {
            CollectionOutcome::Success {
                source_type,
                item_count,
                payload,
                source_info,
                collection_time_ms,
                collected_at,
            } => {
                let source_name = ["subreddits", "channels"]
                    .iter()
                    .find_map(|key| source_info.get(*key).and_then(source_name_from))
                    .unwrap_or_else(|| "unknown".to_string());

                Some(Self {
                    id: Uuid::new_v4(),
                    cycle_id,
                    source_type: source_type.as_str().to_string(),
                    source_name,
                    data: payload.clone(),
                    data_size_bytes: payload.to_string().len(),
                    item_count: *item_count,
                    collection_time_ms: *collection_time_ms,
                    collected_at: *collected_at,
                })
            }
            CollectionOutcome::Failure { .. } => None,
        }
    }
}

fn source_name_from(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) if !items.is_empty() => Some(
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Source type '{source_type}' not supported")]
    UnsupportedSource { source_type: String },

    #[error("Missing {source_name} credentials for {credential_ref}: {missing}")]
    CredentialMissing {
        source_name: String,
        credential_ref: String,
        missing: String,
    },

    #[error("Failed to collect from {source_type}: {message}")]
    Adapter { source_type: String, message: String },

    #[error("No data collected from any source. Check collection logs and source configurations.")]
    NoDataCollected,

    #[error("{0}")]
    Summarization(String),

    #[error("Invalid cycle transition from {from} to {to}")]
    InvalidTransition { from: CycleStatus, to: CycleStatus },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Cycle not found: {id}")]
    CycleNotFound { id: Uuid },

    #[error("Source config not found: {id}")]
    SourceConfigNotFound { id: Uuid },

    #[error("Source config {id} is disabled")]
    SourceConfigDisabled { id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
