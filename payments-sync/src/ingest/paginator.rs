use crate::error::SyncError;
use crate::models::RecordKind;
use crate::services::{Page, PageFetcher};
use futures::stream::{self, Stream};
use std::sync::Arc;

enum Position {
    Start,
    Cursor(String),
}

/// Walks a remote collection page by page, strictly in sequence.
///
/// The stream ends after the page without a `next_cursor`, or right after
/// yielding the first fetch error. Every call to [`pages`](Self::pages)
/// starts from the beginning of the collection.
pub struct CursorPaginator {
    fetcher: Arc<dyn PageFetcher>,
}

impl CursorPaginator {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    pub fn kind(&self) -> RecordKind {
        self.fetcher.kind()
    }

    pub fn pages(&self) -> impl Stream<Item = Result<Page, SyncError>> + Send + 'static {
        let fetcher = Arc::clone(&self.fetcher);

        stream::try_unfold(Some(Position::Start), move |position| {
            let fetcher = Arc::clone(&fetcher);
            async move {
                let Some(position) = position else {
                    return Ok(None);
                };
                let cursor = match &position {
                    Position::Start => None,
                    Position::Cursor(cursor) => Some(cursor.as_str()),
                };

                let page = fetcher.fetch(cursor).await?;
                let next = page.next_cursor.clone().map(Position::Cursor);
                Ok(Some((page, next)))
            }
        })
    }
}
