//! payments-sync command-line entry point.

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use payments_sync::config::SyncConfig;
use payments_sync::jobs::{self, JobSettings};
use payments_sync::models::{BuiltinRule, RecordKind};
use payments_sync::services::metrics::init_metrics;
use payments_sync::services::{
    FetcherFactory, MongoStore, PageQuery, RecordStore, RutterClients, WindowMode,
};
use payments_sync::startup::{AppState, Application};
use service_core::observability::{init_tracing, shutdown_tracing};
use std::sync::Arc;
use tokio::signal;

/// Imports Rutter payment records into MongoDB and reconciles them
#[derive(Parser)]
#[command(name = "payments-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import one record kind from the Rutter API
    Import {
        kind: RecordKind,

        /// Records buffered per upsert batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Only records created at or after this RFC 3339 instant
        #[arg(long)]
        created_after: Option<DateTime<Utc>>,

        /// Only records created at or before this RFC 3339 instant
        #[arg(long)]
        created_before: Option<DateTime<Utc>>,
    },

    /// Report candidates without a counterpart
    Reconcile {
        rule: BuiltinRule,

        /// Source records read per window
        #[arg(long)]
        window_size: Option<u32>,

        #[arg(long, value_enum)]
        window_mode: Option<WindowMode>,
    },

    /// Write the monthly transaction summary
    Summary,

    /// Serve health, metrics and job triggers over HTTP
    Serve,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = SyncConfig::load().context("Failed to load configuration")?;
    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )
    .context("Failed to initialize tracing")?;

    let result = run(cli.command, &config).await;
    if let Err(e) = &result {
        tracing::error!("payments-sync failed: {:#}", e);
    }

    shutdown_tracing();
    result
}

async fn run(command: Commands, config: &SyncConfig) -> anyhow::Result<()> {
    let mongo = MongoStore::connect(&config.mongodb.uri, &config.mongodb.database)
        .await
        .context("Failed to connect to MongoDB")?;

    // Every exit after a successful connect goes through the one close below.
    let outcome = dispatch(command, config, &mongo).await;
    mongo.close().await;
    outcome
}

async fn dispatch(command: Commands, config: &SyncConfig, mongo: &MongoStore) -> anyhow::Result<()> {
    mongo
        .initialize_indexes()
        .await
        .context("Failed to initialize database indexes")?;

    let store: Arc<dyn RecordStore> = Arc::new(mongo.clone());
    let mut settings = JobSettings::from_config(config);

    match command {
        Commands::Import {
            kind,
            batch_size,
            created_after,
            created_before,
        } => {
            if let Some(batch_size) = batch_size {
                settings.batch_size = batch_size;
            }
            let fetchers = RutterClients::new(config.rutter.clone());
            let query = PageQuery {
                created_after,
                created_before,
            };
            jobs::run_import(store, &fetchers, &settings, kind, query)
                .await
                .map(|report| {
                    tracing::info!(
                        kind = %report.kind,
                        count = report.count,
                        elapsed_secs = report.elapsed.as_secs_f64(),
                        "Total {}: {}",
                        report.kind,
                        report.count
                    );
                })
                .map_err(anyhow::Error::from)
        }
        Commands::Reconcile {
            rule,
            window_size,
            window_mode,
        } => {
            if let Some(window_size) = window_size {
                settings.window_size = window_size;
            }
            if let Some(window_mode) = window_mode {
                settings.window_mode = window_mode;
            }
            jobs::run_reconciliation(store, &settings, rule)
                .await
                .map(|outcome| {
                    tracing::info!(
                        rule = %rule,
                        missing = outcome.missing,
                        path = %outcome.report_path.display(),
                        "Reconciliation report written"
                    );
                })
                .map_err(anyhow::Error::from)
        }
        Commands::Summary => jobs::run_summary(store, &settings, Utc::now())
            .await
            .map(|outcome| {
                tracing::info!(
                    path = %outcome.report_path.display(),
                    pdf = %outcome.pdf_path.display(),
                    "Summary report written"
                );
            })
            .map_err(anyhow::Error::from),
        Commands::Serve => serve(store, config, settings).await,
    }
}

async fn serve(
    store: Arc<dyn RecordStore>,
    config: &SyncConfig,
    settings: JobSettings,
) -> anyhow::Result<()> {
    init_metrics();

    let fetchers: Arc<dyn FetcherFactory> = Arc::new(RutterClients::new(config.rutter.clone()));
    let state = AppState::new(store, fetchers, settings);

    let application = Application::build(config.common.port, state)
        .await
        .context("Failed to start HTTP server")?;
    application.run_until_stopped(shutdown_signal()).await?;
    Ok(())
}
