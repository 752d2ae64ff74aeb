//! Public SDK surface for MoneyDesk.
//!
//! Re-exports the building blocks and wires the default collaborators
//! (SQLite store, file knowledge base, HTTP completion client) from config.

/// Re-export for convenience.
pub use moneydesk_rs_config as config;
pub use moneydesk_rs_core as core;
/// Re-export for convenience.
pub use moneydesk_rs_kb as kb;
/// Re-export for convenience.
pub use moneydesk_rs_protocol as protocol;
pub use moneydesk_rs_server as server;

use anyhow::Context;
use log::{debug, info};
use moneydesk_rs_config::{LayeredConfigOptions, MoneyDeskConfig};
use moneydesk_rs_core::{MessageRouter, OpenAiCompletionClient, SqliteStore};
use moneydesk_rs_kb::FileKnowledgeBase;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Initialize logging with env_logger; `RUST_LOG` controls the filter.
pub fn init_logging() {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();
}

/// Load layered config from `cwd`, with `runtime_paths` applied last.
pub fn load_config(cwd: &Path, runtime_paths: &[PathBuf]) -> anyhow::Result<MoneyDeskConfig> {
    let options = runtime_paths
        .iter()
        .fold(LayeredConfigOptions::new(cwd), |options, path| {
            options.with_runtime_path(path)
        });
    let layered = MoneyDeskConfig::load_layered_with_options(options)
        .context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

/// Load the KB corpus from `kb.corpus_path`, or the bundled articles.
pub fn load_knowledge_base(config: &MoneyDeskConfig) -> anyhow::Result<FileKnowledgeBase> {
    let kb = match config.kb.corpus_path.as_deref() {
        Some(path) => FileKnowledgeBase::load(path)
            .with_context(|| format!("failed to load kb corpus from {path}"))?,
        None => FileKnowledgeBase::builtin().context("failed to load bundled kb corpus")?,
    };
    info!("knowledge base loaded (articles={})", kb.len());
    Ok(kb)
}

/// Build a router backed by the SQLite store at `config.storage`.
pub fn build_router(config: &MoneyDeskConfig) -> anyhow::Result<MessageRouter> {
    let db_path = config
        .database_path()
        .context("no storage path configured and no home directory found")?;
    let store = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?,
    );
    build_router_with_store(config, store)
}

/// Build a router over an already opened store.
pub fn build_router_with_store(
    config: &MoneyDeskConfig,
    store: Arc<SqliteStore>,
) -> anyhow::Result<MessageRouter> {
    let kb = Arc::new(load_knowledge_base(config)?);
    let completion = Arc::new(
        OpenAiCompletionClient::from_config(&config.ai)
            .context("failed to build completion client")?,
    );
    let router = MessageRouter::builder()
        .config(config)
        .knowledge_base(kb)
        .conversations(store.clone())
        .usage_store(store.clone())
        .usage_log(store)
        .completion(completion)
        .build()
        .context("failed to build message router")?;
    Ok(router)
}
