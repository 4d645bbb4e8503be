//! Runs shared by the CLI commands and the HTTP triggers.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::ingest::{IngestReport, IngestionPipeline};
use crate::models::{BuiltinRule, RecordKind};
use crate::reconcile::{ReconciliationDriver, ReconciliationReport};
use crate::reports::{missing_report, MonthlySummary};
use crate::services::{FetcherFactory, PageQuery, RecordStore, WindowMode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub batch_size: usize,
    pub window_size: u32,
    pub window_mode: WindowMode,
    pub report_dir: PathBuf,
}

impl JobSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            batch_size: config.ingest.batch_size,
            window_size: config.reconcile.window_size,
            window_mode: config.reconcile.window_mode,
            report_dir: config.reconcile.report_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationOutcome {
    #[serde(flatten)]
    pub report: ReconciliationReport,
    pub missing: usize,
    pub report_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryOutcome {
    #[serde(flatten)]
    pub summary: MonthlySummary,
    pub report_path: PathBuf,
    pub pdf_path: PathBuf,
}

#[instrument(skip(store, fetchers, settings))]
pub async fn run_import(
    store: Arc<dyn RecordStore>,
    fetchers: &dyn FetcherFactory,
    settings: &JobSettings,
    kind: RecordKind,
    query: PageQuery,
) -> Result<IngestReport, SyncError> {
    let fetcher = fetchers.fetcher(kind, query)?;
    IngestionPipeline::new(fetcher, store, settings.batch_size)
        .run()
        .await
}

/// Reconciles with a built-in rule and writes its missing-set CSV.
#[instrument(skip(store, settings))]
pub async fn run_reconciliation(
    store: Arc<dyn RecordStore>,
    settings: &JobSettings,
    rule: BuiltinRule,
) -> Result<ReconciliationOutcome, SyncError> {
    let match_rule = rule.rule();
    let report = ReconciliationDriver::new(store, settings.window_size, settings.window_mode)
        .reconcile(&match_rule)
        .await?;

    let missing = report.missing.len();
    tracing::info!(rule = %rule, missing, "Missing candidates: {}", missing);

    let report_path = missing_report(&match_rule, &report.missing)
        .write(&settings.report_dir, match_rule.report.file_name)
        .await?;

    Ok(ReconciliationOutcome {
        report,
        missing,
        report_path,
    })
}

/// Builds the monthly summary up to the end of the month before `now` and
/// writes it as CSV and PDF side by side.
#[instrument(skip(store, settings))]
pub async fn run_summary(
    store: Arc<dyn RecordStore>,
    settings: &JobSettings,
    now: DateTime<Utc>,
) -> Result<SummaryOutcome, SyncError> {
    let summary = crate::reports::summary::generate(store.as_ref(), now).await?;
    let stem = summary.file_stem();
    let report_path = summary
        .to_csv()
        .write(&settings.report_dir, &format!("{}.csv", stem))
        .await?;
    let pdf_path = summary
        .to_pdf()
        .write(&settings.report_dir, &format!("{}.pdf", stem))
        .await?;

    tracing::info!(
        lines = summary.line_count(),
        months = summary.months.len(),
        "Total Records Processed: {}",
        summary.line_count()
    );

    Ok(SummaryOutcome {
        summary,
        report_path,
        pdf_path,
    })
}
