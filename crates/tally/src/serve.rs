// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally serve`: wire the adapters, the pipeline and the gateway, then run
//! until a shutdown signal arrives.

use std::sync::Arc;

use tally_config::TallyConfig;
use tally_core::{HealthStatus, PluginAdapter, TallyError};
use tally_gateway::{AuthConfig, GatewayState, HealthState, ServerConfig};
use tally_memory::{HttpEmbedder, SqliteMemoryStore};
use tally_openai::OpenAiAnalysisModel;
use tally_pipeline::ExpensePipeline;
use tally_storage::SqliteRecordStore;
use tracing::{error, info, warn};

use crate::shutdown;

/// Run the server with the given configuration.
pub async fn run_serve(config: TallyConfig) -> Result<(), TallyError> {
    init_tracing(&config.log.level);
    info!(version = env!("CARGO_PKG_VERSION"), "starting tally");

    let records = Arc::new(SqliteRecordStore::new(config.storage.clone()));
    records.initialize().await?;
    info!(path = %config.storage.database_path, "record store ready");

    let memory = Arc::new(
        SqliteMemoryStore::new(
            records.database()?.connection().clone(),
            config.memory.collection.clone(),
        )
        .with_threshold(config.memory.similarity_threshold),
    );
    let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);
    let model = Arc::new(OpenAiAnalysisModel::new(&config.model)?);

    let adapters: Vec<Arc<dyn PluginAdapter>> = vec![
        records.clone() as Arc<dyn PluginAdapter>,
        memory.clone(),
        embedder.clone(),
        model.clone(),
    ];
    report_health(&adapters).await;

    let pipeline = Arc::new(ExpensePipeline::new(
        embedder,
        memory,
        model,
        records,
        config.pipeline.clone(),
        config.memory.clone(),
    ));

    let state = GatewayState {
        pipeline,
        auth: AuthConfig {
            bearer_token: config.server.bearer_token.clone(),
        },
        health: HealthState::default(),
    };
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };

    let cancel = shutdown::install_signal_handler();
    let result = tally_gateway::start_server(&server_config, state, cancel).await;

    shutdown_adapters(&adapters).await;
    info!("tally stopped");
    result
}

async fn report_health(adapters: &[Arc<dyn PluginAdapter>]) {
    for adapter in adapters {
        match adapter.health_check().await {
            Ok(HealthStatus::Healthy) => {
                info!(adapter = adapter.name(), kind = %adapter.adapter_type(), "adapter healthy")
            }
            Ok(status) => {
                warn!(adapter = adapter.name(), status = ?status, "adapter not healthy")
            }
            Err(e) => warn!(adapter = adapter.name(), error = %e, "health check failed"),
        }
    }
}

/// Shut adapters down in reverse order of construction.
async fn shutdown_adapters(adapters: &[Arc<dyn PluginAdapter>]) {
    for adapter in adapters.iter().rev() {
        if let Err(e) = adapter.shutdown().await {
            error!(adapter = adapter.name(), error = %e, "adapter shutdown failed");
        }
    }
}

/// Targets that follow `log.level`; everything else logs at `warn`.
const LOG_TARGETS: &[&str] = &[
    "tally",
    "tally_storage",
    "tally_memory",
    "tally_openai",
    "tally_pipeline",
    "tally_gateway",
];

fn default_filter(log_level: &str) -> String {
    let mut directives: Vec<String> = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={log_level}"))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
