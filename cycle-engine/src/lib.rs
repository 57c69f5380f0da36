pub mod types;
pub mod config;
pub mod credentials;
pub mod timeframe;
pub mod sources;
pub mod orchestrator;
pub mod aggregator;
pub mod pricing;
pub mod llm_adapter;
pub mod summary;
pub mod store;
pub mod cycle;

pub use types::*;
pub use config::{EngineConfig, GenerationConfig, HttpConfig};
pub use credentials::{CredentialSource, EnvCredentials, StaticCredentials};
pub use sources::SourceRegistry;
pub use orchestrator::CollectionOrchestrator;
pub use aggregator::aggregate;
pub use pricing::{ModelPrice, PriceLookup, PricingTable};
pub use llm_adapter::{LlmAdapterRegistry, MockLlmAdapter};
pub use summary::SummaryGenerator;
pub use store::{CycleDetail, CycleListPage, CycleStore, CycleView, InMemoryCycleStore, PgCycleStore};
pub use cycle::CycleEngine;
