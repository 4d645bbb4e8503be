//! The document-store seam every component receives at construction.

use crate::error::SyncError;
use crate::models::{Filter, Record, RecordKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Replaced => "replaced",
        }
    }
}

/// How reconciliation walks a source collection.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    /// `_id` greater than the last key seen. Stable under concurrent inserts.
    #[default]
    Keyset,
    /// `skip`/`limit` over `_id` order.
    Offset,
}

impl fmt::Display for WindowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyset => f.write_str("keyset"),
            Self::Offset => f.write_str("offset"),
        }
    }
}

impl FromStr for WindowMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyset" => Ok(Self::Keyset),
            "offset" => Ok(Self::Offset),
            other => Err(SyncError::Config(format!("unknown window mode: {}", other))),
        }
    }
}

/// One read of a reconciliation scan, always in ascending `_id` order.
#[derive(Debug, Clone, PartialEq)]
pub enum Window {
    Offset { skip: u64, limit: u32 },
    After { key: Option<Bson>, limit: u32 },
}

impl Window {
    pub fn first(mode: WindowMode, limit: u32) -> Self {
        match mode {
            WindowMode::Offset => Window::Offset { skip: 0, limit },
            WindowMode::Keyset => Window::After { key: None, limit },
        }
    }

    pub fn limit(&self) -> u32 {
        match self {
            Window::Offset { limit, .. } | Window::After { limit, .. } => *limit,
        }
    }
}

/// Per-month aggregate of `platform_data.amount` grouped by
/// `platform_data.type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyTotal {
    pub year: i32,
    pub month: u32,
    pub entry_type: Option<String>,
    /// Sum in minor currency units.
    pub total: i64,
    pub count: u64,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert-or-replace keyed on the record's `id`.
    async fn upsert(&self, kind: RecordKind, record: &Record) -> Result<UpsertOutcome, SyncError>;

    async fn find_one(&self, kind: RecordKind, filter: &Filter)
        -> Result<Option<Record>, SyncError>;

    async fn find_window(
        &self,
        kind: RecordKind,
        filter: &Filter,
        window: &Window,
    ) -> Result<Vec<Record>, SyncError>;

    async fn count(&self, kind: RecordKind, filter: &Filter) -> Result<u64, SyncError>;

    async fn earliest_created_at(&self, kind: RecordKind)
        -> Result<Option<DateTime<Utc>>, SyncError>;

    /// Totals for records created within `[start, end]`, ordered by year,
    /// month, then type.
    async fn monthly_totals(
        &self,
        kind: RecordKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MonthlyTotal>, SyncError>;

    async fn health_check(&self) -> Result<(), SyncError>;
}
