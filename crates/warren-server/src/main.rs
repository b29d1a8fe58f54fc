//! Warren Server
//!
//! Standalone Warren server binary.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use warren_core::{init_telemetry, StorageBackend, TelemetryConfig, WarrenConfig};
use warren_server::{api, build_runtime, AppState};

/// Warren server CLI
#[derive(Parser, Debug)]
#[command(name = "warren-server")]
#[command(about = "Single-process virtual actor server")]
#[command(version)]
struct Cli {
    /// Configuration file path (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overriding the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Data directory; selects the file store
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<WarrenConfig> {
        let mut config = match &self.config {
            Some(path) => WarrenConfig::from_file(path)?,
            None => WarrenConfig::default(),
        };
        if let Some(bind) = &self.bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(data_dir) = &self.data_dir {
            config.storage.backend = StorageBackend::File;
            config.storage.data_dir = Some(data_dir.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::new("warren-server")
        .with_log_level(TelemetryConfig::level_for_verbosity(cli.verbose));
    if cli.json_logs {
        telemetry = telemetry.with_json();
    }
    init_telemetry(telemetry)?;

    let config = cli.load_config()?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = config.server.worker_threads {
        builder.worker_threads(threads);
    }
    let tokio_runtime = builder.build().context("failed to build tokio runtime")?;

    tokio_runtime.block_on(serve(config))
}

async fn serve(config: WarrenConfig) -> anyhow::Result<()> {
    let runtime = build_runtime(&config).await?;
    runtime.start().await?;

    let state = AppState::new(runtime);
    let app = api::router(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address))?;
    info!(
        bind = %config.server.bind_address,
        backend = ?config.storage.backend,
        "Warren server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutting down actor runtime");
    state.runtime().stop().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
