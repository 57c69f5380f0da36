use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cycle_engine::config::{self, EngineConfig};
use cycle_engine::{
    CollectSpec, CollectionOrchestrator, CycleEngine, CycleStatus, CycleStore, EnvCredentials, InMemoryCycleStore,
    LlmAdapterRegistry, PgCycleStore, PricingTable, SourceConfig, SourceConfigUpdate, SourceRegistry, SourceType,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "cycle-engine")]
#[command(about = "Collect from configured sources and produce a summarized digest", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one cycle from a request file
    Run {
        request: PathBuf,
        /// Saved source config to add to the request (repeatable)
        #[arg(long = "source-config")]
        source_configs: Vec<Uuid>,
    },
    /// List stored cycles, newest first
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
        #[arg(long)]
        status: Option<CycleStatus>,
    },
    /// Show one cycle with its collected data and summary
    Show { id: Uuid },
    /// Delete a cycle and everything recorded for it
    Delete { id: Uuid },
    /// Manage saved source configs
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },
}

#[derive(Subcommand)]
enum SourceCommands {
    /// Save a new source config
    Add {
        #[arg(long)]
        name: String,
        #[arg(long = "type")]
        source_type: SourceType,
        /// Env var prefix holding the credentials, e.g. REDDIT_CLIENT_1
        #[arg(long, default_value = "")]
        credential_ref: String,
        /// Collection spec as a JSON object
        #[arg(long)]
        spec: Option<String>,
        #[arg(long)]
        disabled: bool,
    },
    /// List saved source configs
    List {
        #[arg(long = "type")]
        source_type: Option<SourceType>,
        #[arg(long)]
        enabled: Option<bool>,
    },
    Show { id: Uuid },
    /// Change the given fields of a saved source config
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        credential_ref: Option<String>,
        #[arg(long)]
        spec: Option<String>,
        #[arg(long)]
        enabled: Option<bool>,
    },
    Delete { id: Uuid },
}

fn parse_spec(raw: &str) -> Result<CollectSpec> {
    serde_json::from_str(raw).context("--spec must be a JSON object")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cycle_engine=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

async fn open_store(config: &EngineConfig) -> Result<Arc<dyn CycleStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PgCycleStore::connect(url).await.map_err(|e| {
                error!("Failed to connect to database. Check DATABASE_URL.");
                e
            })?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set, cycles are kept in memory for this run only");
            Ok(Arc::new(InMemoryCycleStore::new()))
        }
    }
}

fn build_engine(config: &EngineConfig, store: Arc<dyn CycleStore>) -> Result<CycleEngine> {
    let registry = SourceRegistry::with_http_adapters(&config.http)?;
    let orchestrator = CollectionOrchestrator::new(registry, Arc::new(EnvCredentials));
    let generators = LlmAdapterRegistry::with_remote_providers(&config.generation)?;

    Ok(CycleEngine::new(orchestrator, generators, store)
        .with_pricing(PricingTable::with_overrides(&config.pricing))
        .with_generation_config(config.generation.clone()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let engine_config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    }
    .with_env();

    let store = open_store(&engine_config).await?;
    let engine = build_engine(&engine_config, store)?;

    match cli.command {
        Commands::Run {
            request,
            source_configs,
        } => {
            let mut request = config::load_request(&request)?;
            request.source_config_ids.extend(source_configs);
            let cycle = engine.run_cycle(request).await?;
            info!("Cycle {} finished with status {}", cycle.id, cycle.status);
            println!("{}", serde_json::to_string_pretty(&cycle)?);
        }
        Commands::List {
            page,
            page_size,
            status,
        } => {
            let listing = engine.store().list_cycles(page, page_size, status).await?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Commands::Show { id } => {
            let detail = engine.cycle_detail(id).await?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
        Commands::Delete { id } => {
            engine.delete_cycle(id).await?;
            println!("Deleted cycle {}", id);
        }
        Commands::Source { command } => run_source_command(&engine, command).await?,
    }

    Ok(())
}

async fn run_source_command(engine: &CycleEngine, command: SourceCommands) -> Result<()> {
    match command {
        SourceCommands::Add {
            name,
            source_type,
            credential_ref,
            spec,
            disabled,
        } => {
            let collect_spec = spec.as_deref().map(parse_spec).transpose()?.unwrap_or_default();
            let mut source_config = SourceConfig::new(name, source_type, credential_ref, collect_spec)?;
            if disabled {
                source_config = source_config.disabled();
            }
            let saved = engine.create_source_config(source_config).await?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }
        SourceCommands::List { source_type, enabled } => {
            let configs = engine.list_source_configs(source_type, enabled).await?;
            println!("{}", serde_json::to_string_pretty(&configs)?);
        }
        SourceCommands::Show { id } => {
            let source_config = engine.source_config(id).await?;
            println!("{}", serde_json::to_string_pretty(&source_config)?);
        }
        SourceCommands::Update {
            id,
            name,
            credential_ref,
            spec,
            enabled,
        } => {
            let update = SourceConfigUpdate {
                name,
                credential_ref,
                collect_spec: spec.as_deref().map(parse_spec).transpose()?,
                enabled,
            };
            let updated = engine.update_source_config(id, update).await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        SourceCommands::Delete { id } => {
            engine.delete_source_config(id).await?;
            println!("Deleted source config {}", id);
        }
    }
    Ok(())
}
