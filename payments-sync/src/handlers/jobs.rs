//! Job triggers. Runs are mutually exclusive: a trigger arriving while
//! another job holds the lock is rejected with 409.

use crate::error::SyncError;
use crate::ingest::IngestReport;
use crate::jobs::{self, ReconciliationOutcome, SummaryOutcome};
use crate::models::{BuiltinRule, RecordKind};
use crate::services::PageQuery;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use service_core::error::AppError;
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default, Deserialize)]
pub struct ImportParams {
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

fn acquire_job_lock(state: &AppState) -> Result<OwnedMutexGuard<()>, AppError> {
    state.job_lock.clone().try_lock_owned().map_err(|_| {
        tracing::warn!("Rejected job trigger while another job is running");
        AppError::Conflict(anyhow::anyhow!("Another job is already running"))
    })
}

fn bad_request(err: SyncError) -> AppError {
    AppError::BadRequest(anyhow::anyhow!(err.to_string()))
}

pub async fn trigger_import(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<ImportParams>,
) -> Result<Json<IngestReport>, AppError> {
    let kind: RecordKind = kind.parse().map_err(bad_request)?;
    let _guard = acquire_job_lock(&state)?;

    let query = PageQuery {
        created_after: params.created_after,
        created_before: params.created_before,
    };
    let report = jobs::run_import(
        state.store.clone(),
        state.fetchers.as_ref(),
        &state.settings,
        kind,
        query,
    )
    .await?;

    Ok(Json(report))
}

pub async fn trigger_reconciliation(
    State(state): State<AppState>,
    Path(rule): Path<String>,
) -> Result<Json<ReconciliationOutcome>, AppError> {
    let rule: BuiltinRule = rule.parse().map_err(bad_request)?;
    let _guard = acquire_job_lock(&state)?;

    let outcome = jobs::run_reconciliation(state.store.clone(), &state.settings, rule).await?;
    Ok(Json(outcome))
}

pub async fn trigger_summary(
    State(state): State<AppState>,
) -> Result<Json<SummaryOutcome>, AppError> {
    let _guard = acquire_job_lock(&state)?;

    let outcome = jobs::run_summary(state.store.clone(), &state.settings, Utc::now()).await?;
    Ok(Json(outcome))
}
