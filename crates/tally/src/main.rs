// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tally - streaming expense analysis with retrieval-augmented categorization.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tally_config::{ConfigError, TallyConfig};

/// Tally - streaming expense analysis.
#[derive(Parser, Debug)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG lookup.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server.
    Serve,
    /// Validate the configuration and print a summary.
    CheckConfig,
}

fn load(path: Option<&Path>) -> Result<TallyConfig, Vec<ConfigError>> {
    match path {
        Some(path) => tally_config::load_and_validate_path(path),
        None => tally_config::load_and_validate(),
    }
}

/// Render a redacted, human-readable configuration summary.
fn summarize(config: &TallyConfig) -> String {
    let mut lines = vec![
        format!("server:    {}:{}", config.server.host, config.server.port),
        format!(
            "auth:      {}",
            if config.server.bearer_token.is_some() {
                "bearer token [redacted]"
            } else {
                "none"
            }
        ),
        format!("model:     {} @ {}", config.model.model, config.model.base_url),
        format!(
            "embedding: {} ({} dims) @ {}",
            config.embedding.model, config.embedding.dimensions, config.embedding.base_url
        ),
        format!(
            "memory:    collection={} limit={} threshold={}",
            config.memory.collection,
            config.memory.retrieval_limit,
            config
                .memory
                .similarity_threshold
                .map_or_else(|| "none".to_string(), |t| t.to_string())
        ),
        format!(
            "storage:   {} (wal={})",
            config.storage.database_path, config.storage.wal_mode
        ),
        format!(
            "pipeline:  {} categories, roast_default={}, retrieval_failure={:?}",
            config.pipeline.categories.len(),
            config.pipeline.roast_default,
            config.pipeline.retrieval_failure
        ),
        format!("log:       {}", config.log.level),
    ];
    if config.model.api_key.is_some() {
        lines.push("model.api_key: [redacted]".to_string());
    }
    lines.join("\n")
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            tally_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("tally: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig) => {
            println!("tally: configuration is valid\n{}", summarize(&config));
        }
        None => {
            println!("tally: use --help for available commands");
        }
    }
}
