use super::matcher::{Classification, Matcher};
use crate::error::SyncError;
use crate::models::{serialize_secs, MatchRule, Record};
use crate::services::metrics::record_candidate;
use crate::services::{RecordStore, Window, WindowMode};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// A candidate without a counterpart and the keys that were looked up.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingEntry {
    pub record: Record,
    pub keys: Vec<String>,
}

impl MissingEntry {
    pub fn primary_key(&self) -> Option<&str> {
        self.keys.first().map(String::as_str)
    }
}

/// Missing candidates in the order they were scanned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingSet {
    entries: Vec<MissingEntry>,
}

impl MissingSet {
    pub fn push(&mut self, entry: MissingEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MissingEntry> {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.record.id()).collect()
    }

    pub fn into_inner(self) -> Vec<MissingEntry> {
        self.entries
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub rule: String,
    /// Candidate count taken before the scan, for progress display only.
    pub advisory_total: u64,
    pub scanned: usize,
    pub matched: usize,
    pub skipped: usize,
    pub windows: usize,
    #[serde(skip)]
    pub missing: MissingSet,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

/// Walks the source collection in fixed-size windows ordered by `_id` and
/// classifies every candidate, one lookup at a time.
pub struct ReconciliationDriver {
    store: Arc<dyn RecordStore>,
    matcher: Matcher,
    window_size: u32,
    mode: WindowMode,
}

impl ReconciliationDriver {
    pub fn new(store: Arc<dyn RecordStore>, window_size: u32, mode: WindowMode) -> Self {
        Self {
            matcher: Matcher::new(Arc::clone(&store)),
            store,
            window_size: window_size.max(1),
            mode,
        }
    }

    /// Scans until a window comes back empty.
    #[instrument(skip(self, rule), fields(rule = %rule.name, mode = %self.mode, window_size = self.window_size))]
    pub async fn reconcile(&self, rule: &MatchRule) -> Result<ReconciliationReport, SyncError> {
        let started = Instant::now();
        let advisory_total = self
            .store
            .count(rule.source_kind, &rule.source_filter)
            .await?;
        tracing::info!(rule = %rule.name, total = advisory_total, "Reconciling {} candidates", advisory_total);

        let mut window = Window::first(self.mode, self.window_size);
        let mut missing = MissingSet::default();
        let (mut scanned, mut matched, mut skipped, mut windows) = (0, 0, 0, 0);

        loop {
            let candidates = self
                .store
                .find_window(rule.source_kind, &rule.source_filter, &window)
                .await?;
            if candidates.is_empty() {
                tracing::debug!(rule = %rule.name, window = windows + 1, "Empty window, scan complete");
                break;
            }

            windows += 1;
            let next = advance(&window, &candidates)?;

            for candidate in candidates {
                scanned += 1;
                let classification = self.matcher.classify(&candidate, rule).await?;
                record_candidate(&rule.name, classification.outcome());
                match classification {
                    Classification::Matched(_) => matched += 1,
                    Classification::Skipped(_) => skipped += 1,
                    Classification::Missing(keys) => missing.push(MissingEntry {
                        record: candidate,
                        keys,
                    }),
                }
            }

            tracing::info!(
                rule = %rule.name,
                window = windows,
                scanned,
                missing = missing.len(),
                "Progress: {:.2}%",
                progress(scanned, advisory_total)
            );
            window = next;
        }

        let elapsed = started.elapsed();
        tracing::info!(
            rule = %rule.name,
            scanned,
            matched,
            skipped,
            missing = missing.len(),
            "Reconciliation completed in {:.2} seconds",
            elapsed.as_secs_f64()
        );

        Ok(ReconciliationReport {
            rule: rule.name.clone(),
            advisory_total,
            scanned,
            matched,
            skipped,
            windows,
            missing,
            elapsed,
        })
    }
}

fn advance(window: &Window, candidates: &[Record]) -> Result<Window, SyncError> {
    match window {
        Window::Offset { skip, limit } => Ok(Window::Offset {
            skip: skip + candidates.len() as u64,
            limit: *limit,
        }),
        Window::After { limit, .. } => {
            let key = candidates
                .last()
                .and_then(Record::store_key)
                .cloned()
                .ok_or_else(|| SyncError::Store("window record without `_id`".to_string()))?;
            Ok(Window::After {
                key: Some(key),
                limit: *limit,
            })
        }
    }
}

/// Scan progress against the advisory total, capped at 100.
fn progress(scanned: usize, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (scanned as f64 / total as f64 * 100.0).min(100.0)
}
