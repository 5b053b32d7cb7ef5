// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! portlog receiver
//!
//! # Usage
//!
//! ```bash
//! # Listen on 0.0.0.0:8001, write to ./received_data
//! portlog-receiver
//!
//! # Start from an empty data directory
//! portlog-receiver --data-dir /var/lib/portlog --reset
//!
//! # YAML config with a CLI override
//! portlog-receiver --config portlog.yaml --port 9000
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use portlog::http::{self, AppState};
use portlog::{Config, ConfigBuilder, CsvStore, IngestService, SchemaPolicy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "portlog-receiver")]
#[command(about = "Receive port-tagged samples into rolling CSV logs", long_about = None)]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the per-port CSV files
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Rows kept in the short tier
    #[arg(long)]
    short_capacity: Option<usize>,

    /// Rows kept in the long tier
    #[arg(long)]
    long_capacity: Option<usize>,

    /// What to do when a port changes its channel names
    #[arg(long, value_enum)]
    schema_policy: Option<SchemaPolicy>,

    /// Delete existing logs before starting
    #[arg(long)]
    reset: bool,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        let base = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };

        let mut builder = ConfigBuilder::from_config(base);
        if let Some(dir) = self.data_dir {
            builder = builder.data_dir(dir);
        }
        if let Some(bind) = self.bind {
            builder = builder.bind(bind);
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(rows) = self.short_capacity {
            builder = builder.short_capacity(rows);
        }
        if let Some(rows) = self.long_capacity {
            builder = builder.long_capacity(rows);
        }
        if let Some(policy) = self.schema_policy {
            builder = builder.schema_policy(policy);
        }
        if self.reset {
            builder = builder.reset_on_start(true);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let config = args.into_config()?;

    prepare_data_dir(&config.data_dir, config.reset_on_start)?;

    let store = CsvStore::new(&config.data_dir)?.with_schema_policy(config.schema_policy);
    let service = IngestService::new(Arc::new(store))
        .with_sanitizer(config.sanitizer())
        .with_capacities(config.capacities());

    let addr = config.listen_addr();
    tracing::info!("portlog receiver starting...");
    tracing::info!("  Data dir: {}", config.data_dir.display());
    tracing::info!(
        "  Tiers: short={} long={}",
        config.short_capacity,
        config.long_capacity
    );
    tracing::info!("  Sentinels: {:?}", config.sentinels);
    tracing::info!("  Schema policy: {:?}", config.schema_policy);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("Listening on http://{}", addr);

    let state = Arc::new(AppState::new(service, config));
    http::serve(listener, state, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Create the data directory, emptying it first when `reset` is set.
fn prepare_data_dir(dir: &Path, reset: bool) -> Result<()> {
    if reset && dir.exists() {
        tracing::warn!("Removing existing logs in {}", dir.display());
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("removing {}", dir.display()))?;
    }
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let args = Args::parse_from([
            "portlog-receiver",
            "--port",
            "9100",
            "--long-capacity",
            "50",
            "--schema-policy",
            "reject",
            "--reset",
        ]);
        let config = args.into_config().unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.long_capacity, 50);
        assert_eq!(config.short_capacity, 10);
        assert_eq!(config.schema_policy, SchemaPolicy::Reject);
        assert!(config.reset_on_start);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let args = Args::parse_from(["portlog-receiver", "--short-capacity", "0"]);
        assert!(args.into_config().is_err());
    }

    #[test]
    fn test_reset_empties_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("data");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("data_port_1.csv"), "DateTime,a\n").unwrap();

        prepare_data_dir(&dir, false).unwrap();
        assert!(dir.join("data_port_1.csv").exists());

        prepare_data_dir(&dir, true).unwrap();
        assert!(dir.exists());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }
}
