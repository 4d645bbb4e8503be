use super::batch::BatchUpserter;
use super::paginator::CursorPaginator;
use crate::error::SyncError;
use crate::models::{serialize_secs, RecordKind};
use crate::services::metrics::{record_page_error, record_page_fetched};
use crate::services::{PageFetcher, RecordStore};
use futures::StreamExt;
use serde::Serialize;
use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Outcome of one import run. A page error ends the run early with the
/// records fetched so far already stored.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub kind: RecordKind,
    pub count: usize,
    pub pages: usize,
    pub flushes: usize,
    pub inserted: usize,
    pub replaced: usize,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub stopped_early: Option<String>,
}

impl IngestReport {
    pub fn is_complete(&self) -> bool {
        self.stopped_early.is_none()
    }
}

pub struct IngestionPipeline {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn RecordStore>,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn RecordStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            fetcher,
            store,
            batch_size,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.fetcher.kind()
    }

    /// Pages through the remote collection and upserts every record.
    ///
    /// Store failures abort the run with an error. Page errors do not: they
    /// are logged, the partial batch is flushed, and the report carries the
    /// error in `stopped_early`.
    #[instrument(skip(self), fields(kind = %self.kind(), batch_size = self.batch_size))]
    pub async fn run(&self) -> Result<IngestReport, SyncError> {
        let kind = self.kind();
        let started = Instant::now();
        let paginator = CursorPaginator::new(Arc::clone(&self.fetcher));
        let mut upserter = BatchUpserter::new(Arc::clone(&self.store), kind, self.batch_size);

        let mut pages = pin!(paginator.pages());
        let mut count = 0;
        let mut page_count = 0;
        let mut stopped_early = None;

        while let Some(result) = pages.next().await {
            match result {
                Ok(page) => {
                    let fetched = page.records.len();
                    page_count += 1;
                    count += fetched;
                    record_page_fetched(kind, fetched);
                    tracing::info!(
                        kind = %kind,
                        page = page_count,
                        fetched,
                        total = count,
                        "Fetched {} {}. Total: {}",
                        fetched,
                        kind,
                        count
                    );

                    for record in page.records {
                        upserter.accept(record).await?;
                    }
                }
                Err(e) => {
                    record_page_error(kind);
                    tracing::error!(kind = %kind, page = page_count + 1, error = %e, "Error fetching {}", kind);
                    stopped_early = Some(e.to_string());
                    break;
                }
            }
        }

        let stats = upserter.finish().await?;
        let elapsed = started.elapsed();

        tracing::info!(
            kind = %kind,
            total = count,
            pages = page_count,
            flushes = stats.flushes,
            inserted = stats.inserted,
            replaced = stats.replaced,
            complete = stopped_early.is_none(),
            "{} import completed in {:.2} seconds",
            kind,
            elapsed.as_secs_f64()
        );

        Ok(IngestReport {
            kind,
            count,
            pages: page_count,
            flushes: stats.flushes,
            inserted: stats.inserted,
            replaced: stats.replaced,
            elapsed,
            stopped_early,
        })
    }
}
