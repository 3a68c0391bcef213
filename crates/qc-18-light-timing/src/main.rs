//! # Light Timing Runtime
//!
//! Standalone runner for the light timing subsystem.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RUST_LOG` / `QC_LOG_LEVEL`, `QC_JSON_LOGS`)
//! 2. Load configuration from `QC_LT_*` variables (validated when the service is built)
//! 3. Seed the node directory from `QC_LT_NODES_FILE` (JSON array of nodes)
//! 4. Log consensus timing and fault tolerance for the active set
//! 5. Start the background synchronizer
//! 6. Run until Ctrl+C, then stop the synchronizer

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use qc_18_light_timing::{
    InMemoryNodeDirectory, LightTimingApi, LightTimingConfig, LightTimingService, NodeDirectory,
};

const DEFAULT_NODES_FILE: &str = "nodes.json";

fn init_logging() -> Result<()> {
    let level = std::env::var("QC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .context("invalid log filter")?;
    let json = std::env::var("QC_JSON_LOGS")
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

async fn load_directory() -> Result<InMemoryNodeDirectory> {
    let path = std::env::var("QC_LT_NODES_FILE").unwrap_or_else(|_| DEFAULT_NODES_FILE.to_string());
    let seed = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read node seed file {path}"))?;
    let directory = InMemoryNodeDirectory::from_json_str(&seed)
        .with_context(|| format!("failed to parse node seed file {path}"))?;
    info!(path = %path, nodes = directory.len(), "Loaded node directory");
    Ok(directory)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config = LightTimingConfig::from_env();
    let directory = Arc::new(load_directory().await?);
    let (service, stats) = LightTimingService::with_defaults(Arc::clone(&directory), config)
        .context("invalid light timing configuration")?;

    let active: Vec<String> = directory
        .get_active_nodes()
        .await
        .into_iter()
        .map(|n| n.id)
        .collect();
    match service.consensus_timing(&active).await {
        Ok(timing) => info!(
            validators = timing.validator_count,
            max_delay_ms = timing.max_propagation_delay.as_millis() as u64,
            block_time_ms = timing.block_time.as_millis() as u64,
            clock_offset_ms = timing.optimal_clock_offset.as_millis() as u64,
            "Initial consensus timing"
        ),
        Err(e) => warn!(error = %e, "Consensus timing unavailable for the active set"),
    }
    if let Ok(ft) = service.fault_tolerance(&active).await {
        info!(
            total = ft.total_nodes,
            byzantine = ft.byzantine_tolerance,
            crash = ft.crash_tolerance,
            quorum = ft.quorum_size,
            "Fault tolerance"
        );
    }

    let shutdown = CancellationToken::new();
    let sync_handle = service.start_sync(shutdown.clone());

    info!("Light timing runtime is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    shutdown.cancel();
    sync_handle.await.context("synchronizer task failed")?;

    let snapshot = stats.snapshot();
    info!(
        delays_computed = snapshot.delays_computed,
        validations_accepted = snapshot.validations_accepted,
        validations_rejected = snapshot.validations_rejected,
        syncs_ok = snapshot.syncs_ok,
        syncs_failed = snapshot.syncs_failed,
        "Final stats"
    );
    Ok(())
}
