//! Fasha application binary - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Build the language model, classifier and extractor
//! 3. Index the product catalog
//! 4. Open the SQLite order ledger
//! 5. Start the idle-session sweeper and the axum API server

mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use fasha_api::auth::{resolve_api_keys, API_KEYS_ENV};
use fasha_api::{start_server, AppState};
use fasha_catalog::{
    load_products, CatalogService, DynEmbeddingService, HashEmbedding, HttpEmbeddingService,
    VectorCatalog,
};
use fasha_chat::{
    Collaborators, DialogueEngine, HttpLanguageModel, IntentClassifier, KeywordIntentClassifier,
    LanguageModel, LlmIntentClassifier, LlmOrderExtractor, MockLanguageModel,
};
use fasha_core::config::FashaConfig;
use fasha_core::error::FashaError;
use fasha_storage::{Database, OrderLedger, SqliteLedger};

use crate::cli::{expand_home, CliArgs};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn api_key_from_env(var: &str) -> Option<String> {
    let key = std::env::var(var).ok().filter(|k| !k.trim().is_empty());
    if key.is_none() {
        tracing::warn!(env = %var, "API key variable not set; requests go out unauthenticated");
    }
    key
}

fn build_model(config: &FashaConfig) -> Result<Arc<dyn LanguageModel>, Box<dyn std::error::Error>> {
    match config.llm.provider.as_str() {
        "mock" => {
            tracing::info!("Using offline mock language model");
            Ok(Arc::new(MockLanguageModel::default()))
        }
        "openai" => {
            let key = api_key_from_env(&config.llm.api_key_env);
            tracing::info!(model = %config.llm.model, endpoint = %config.llm.endpoint, "Using HTTP language model");
            Ok(Arc::new(HttpLanguageModel::new(&config.llm, key)?))
        }
        other => Err(FashaError::Config(format!("Unknown llm provider '{}'", other)).into()),
    }
}

fn build_classifier(config: &FashaConfig, model: &Arc<dyn LanguageModel>) -> Arc<dyn IntentClassifier> {
    if config.llm.provider == "mock" {
        Arc::new(KeywordIntentClassifier::new())
    } else {
        Arc::new(LlmIntentClassifier::new(Arc::clone(model)))
    }
}

fn build_embedder(config: &FashaConfig) -> Result<Box<dyn DynEmbeddingService>, FashaError> {
    match config.embedding.provider.as_str() {
        "hash" => Ok(Box::new(HashEmbedding::new(config.embedding.dimensions))),
        "openai" => {
            let key = api_key_from_env(&config.llm.api_key_env);
            Ok(Box::new(HttpEmbeddingService::new(
                &config.embedding,
                key,
                Duration::from_secs(config.llm.timeout_secs),
            )?))
        }
        other => Err(FashaError::Config(format!("Unknown embedding provider '{}'", other))),
    }
}

async fn build_catalog(config: &FashaConfig) -> Result<VectorCatalog, FashaError> {
    let catalog = VectorCatalog::new(build_embedder(config)?, config.catalog.min_score);
    let products_path = expand_home(&config.catalog.products_path);
    if !products_path.exists() {
        tracing::warn!(path = %products_path.display(), "Product file not found; catalog is empty");
        return Ok(catalog);
    }
    let products = load_products(&products_path)?;
    let indexed = catalog.index_products(&products).await?;
    tracing::info!(path = %products_path.display(), indexed, "Catalog indexed");
    Ok(catalog)
}

fn open_ledger(data_dir: &Path, file: &str) -> Result<SqliteLedger, FashaError> {
    let db = Database::new(&data_dir.join(file))?;
    Ok(SqliteLedger::new(Arc::new(db)))
}

fn spawn_session_sweeper(engine: Arc<DialogueEngine>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = engine.evict_idle();
            tracing::debug!(removed, active = engine.active_sessions(), "Session sweep");
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_path = args.resolve_config_path();
    let mut config = FashaConfig::load_or_default(&config_path);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Fasha v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_path.display(), "Configuration resolved");

    let data_dir = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    // Collaborators.
    let model = build_model(&config)?;
    let classifier = build_classifier(&config, &model);
    let extractor = Arc::new(LlmOrderExtractor::new(Arc::clone(&model)));
    let catalog: Arc<dyn CatalogService> = Arc::new(build_catalog(&config).await?);
    let ledger: Arc<dyn OrderLedger> = Arc::new(open_ledger(&data_dir, &config.storage.ledger_file)?);
    tracing::info!(orders = ledger.count().await?, "Order ledger opened");

    let engine = Arc::new(DialogueEngine::new(
        Collaborators {
            classifier,
            extractor,
            catalog: Arc::clone(&catalog),
            model,
            ledger: Arc::clone(&ledger),
        },
        &config,
    ));
    spawn_session_sweeper(Arc::clone(&engine));

    // API server.
    let env_keys = std::env::var(API_KEYS_ENV).ok();
    let api_keys = resolve_api_keys(
        &config.server.api_keys,
        env_keys.as_deref(),
        &data_dir.join("api_key"),
    );
    tracing::info!(keys = api_keys.len(), "API keys configured");

    let state = AppState::new(engine, ledger, catalog, api_keys)
        .with_rate_limit(config.server.rate_limit_per_sec);
    let port = args.resolve_port(config.server.port);
    start_server(&config.server, port, state).await?;
    Ok(())
}
