use crate::pricing::ModelPrice;
use crate::types::{CycleRequest, EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Postgres connection string; `DATABASE_URL` takes precedence.
    pub database_url: Option<String>,
    pub generation: GenerationConfig,
    pub http: HttpConfig,
    /// Extra or overriding per-model prices (USD per 1M tokens).
    pub pricing: BTreeMap<String, ModelPrice>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            generation: GenerationConfig::default(),
            http: HttpConfig::default(),
            pricing: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects prices that would make a summary cost negative or undefined.
    pub fn validate(&self) -> Result<()> {
        if let Some((model, price)) = self.pricing.iter().find(|(_, price)| !price.is_valid()) {
            return Err(EngineError::Config(format!(
                "price for model '{}' must be finite and non-negative (input {}, output {})",
                model, price.input, price.output
            )));
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Applies environment overrides on top of file values.
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.database_url = Some(url);
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2000,
            timeout_seconds: 120,
            user_agent: "Cycle-Engine/1.0".to_string(),
        }
    }
}

/// HTTP settings for the bundled source adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "Cycle-Engine/1.0".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl HttpConfig {
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(Duration::from_secs(self.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;
        Ok(client)
    }
}

pub fn load_request(path: impl AsRef<Path>) -> Result<CycleRequest> {
    let raw = std::fs::read_to_string(path)?;
    request_from_toml_str(&raw)
}

pub fn request_from_toml_str(raw: &str) -> Result<CycleRequest> {
    toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))
}
