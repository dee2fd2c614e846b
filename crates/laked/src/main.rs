//! Context lake daemon.
//!
//! Wires a `ContextEngine` over in-memory backends, recovers any items
//! whose routing never completed, starts the curator and reflector
//! schedules, and runs until interrupted. Configuration comes from the
//! environment: `LAKED_LOG_JSON` switches log output to JSON and
//! `LAKED_CONFIG` points at an optional TOML config file.

use std::sync::Arc;

use anyhow::{Context, Result};
use lake_core::{
    init_tracing, AdapterManifest, ContextEngine, EngineConfig, RoutingPolicy, StoreAdapter,
    StoreKind,
};
use lake_store::fakes::{MemoryArchiveLog, MemoryPlaybook, MemoryStoreAdapter};
use tracing::{info, Level};

fn load_config() -> Result<EngineConfig> {
    match std::env::var("LAKED_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            let config: EngineConfig =
                toml::from_str(&raw).with_context(|| format!("parsing config file {path}"))?;
            Ok(config)
        }
        Err(_) => Ok(EngineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let json_logs = std::env::var("LAKED_LOG_JSON").map(|v| v == "1").unwrap_or(false);
    init_tracing(json_logs, Level::INFO);

    let config = load_config()?;

    let adapters: Vec<Arc<dyn StoreAdapter>> = StoreKind::all()
        .into_iter()
        .map(|kind| Arc::new(MemoryStoreAdapter::new(kind)) as Arc<dyn StoreAdapter>)
        .collect();
    let engine = ContextEngine::new(
        Arc::new(MemoryArchiveLog::new()),
        AdapterManifest::new(adapters),
        Arc::new(MemoryPlaybook::new()),
        RoutingPolicy::default(),
        config,
    )?;

    let recovered = engine.recover().await?;
    info!(
        event = "daemon.started",
        version = lake_core::VERSION,
        recovered = recovered,
    );

    let schedules = engine.spawn_schedules();

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!(event = "daemon.stopping");

    for handle in schedules {
        handle.abort();
    }
    engine.shutdown().await;
    info!(event = "daemon.stopped");
    Ok(())
}
