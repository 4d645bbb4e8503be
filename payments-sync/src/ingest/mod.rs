//! Remote collection import: cursor paging into batched upserts.

pub mod batch;
pub mod paginator;
pub mod pipeline;

pub use batch::{BatchUpserter, FlushStats, DEFAULT_BATCH_SIZE};
pub use paginator::CursorPaginator;
pub use pipeline::{IngestReport, IngestionPipeline};
