use crate::error::SyncError;
use crate::models::{Record, RecordKind};
use crate::services::metrics::{record_batch_flush, record_upsert};
use crate::services::{RecordStore, UpsertOutcome};
use futures::future::join_all;
use serde::Serialize;
use std::mem;
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushStats {
    pub flushes: usize,
    pub records: usize,
    pub inserted: usize,
    pub replaced: usize,
}

/// Buffers records and writes them as point upserts keyed on `id`.
///
/// A flush happens when the buffer reaches the threshold and once more in
/// [`finish`](Self::finish) for the remainder, so `N` records produce
/// `ceil(N / threshold)` flushes. Upserts within a flush run concurrently;
/// `accept` does not return until the flush it triggered has completed.
pub struct BatchUpserter {
    store: Arc<dyn RecordStore>,
    kind: RecordKind,
    threshold: usize,
    buffer: Vec<Record>,
    stats: FlushStats,
}

impl BatchUpserter {
    pub fn new(store: Arc<dyn RecordStore>, kind: RecordKind, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            store,
            kind,
            threshold,
            buffer: Vec::with_capacity(threshold),
            stats: FlushStats::default(),
        }
    }

    pub async fn accept(&mut self, record: Record) -> Result<(), SyncError> {
        self.buffer.push(record);
        if self.buffer.len() >= self.threshold {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), SyncError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch = mem::take(&mut self.buffer);
        let started = Instant::now();
        let store = self.store.as_ref();
        let kind = self.kind;

        let results = join_all(batch.iter().map(|record| upsert_one(store, kind, record))).await;

        self.stats.flushes += 1;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(outcome) => {
                    self.stats.records += 1;
                    match outcome {
                        UpsertOutcome::Inserted => self.stats.inserted += 1,
                        UpsertOutcome::Replaced => self.stats.replaced += 1,
                    }
                    record_upsert(kind, outcome);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        record_batch_flush(kind, started.elapsed());

        tracing::debug!(
            kind = %kind,
            size = batch.len(),
            duration_ms = started.elapsed().as_millis(),
            "Flushed batch"
        );

        match first_error {
            Some(e) => {
                tracing::error!(kind = %kind, error = %e, "Batch upsert failed");
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Flushes whatever is left and returns the run's totals.
    pub async fn finish(mut self) -> Result<FlushStats, SyncError> {
        self.flush().await?;
        Ok(self.stats)
    }

    pub fn stats(&self) -> FlushStats {
        self.stats
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// A concurrent insert of the same `id` can lose the race on the unique
/// index. The second attempt then finds the document and replaces it.
async fn upsert_one(
    store: &dyn RecordStore,
    kind: RecordKind,
    record: &Record,
) -> Result<UpsertOutcome, SyncError> {
    match store.upsert(kind, record).await {
        Err(SyncError::DuplicateKey(message)) => {
            tracing::debug!(kind = %kind, id = %record.id(), %message, "Retrying upsert after duplicate key");
            store.upsert(kind, record).await
        }
        other => other,
    }
}
