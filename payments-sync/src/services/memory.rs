//! In-memory record store for tests and dry runs.

use super::store::{MonthlyTotal, RecordStore, UpsertOutcome, Window};
use crate::error::SyncError;
use crate::models::record::{lookup_path, minor_units, CREATED_AT_FIELD, STORE_KEY_FIELD};
use crate::models::{Filter, Record, RecordKind};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use mongodb::bson::{Bson, Document};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};

/// Keeps documents per kind in ascending `_id` order. `_id` values are
/// assigned from a counter, the way a store assigns them on insert.
pub struct MemoryStore {
    collections: Mutex<HashMap<RecordKind, Vec<Document>>>,
    next_key: AtomicI64,
    upsert_calls: AtomicUsize,
    lookups: AtomicUsize,
    window_reads: Mutex<Vec<usize>>,
    duplicate_key_failures: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            next_key: AtomicI64::new(1),
            upsert_calls: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
            window_reads: Mutex::new(Vec::new()),
            duplicate_key_failures: AtomicUsize::new(0),
        }
    }

    /// Inserts records directly, bypassing upsert accounting.
    pub fn seed(&self, kind: RecordKind, records: Vec<Record>) {
        if let Ok(mut collections) = self.collections.lock() {
            let docs = collections.entry(kind).or_default();
            for record in records {
                docs.push(self.with_store_key(record.into_body()));
            }
        }
    }

    pub fn records(&self, kind: RecordKind) -> Vec<Record> {
        self.collections
            .lock()
            .map(|collections| {
                collections
                    .get(&kind)
                    .map(|docs| {
                        docs.iter()
                            .cloned()
                            .filter_map(|doc| Record::from_document(doc).ok())
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    pub fn len(&self, kind: RecordKind) -> usize {
        self.collections
            .lock()
            .map(|collections| collections.get(&kind).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, kind: RecordKind) -> bool {
        self.len(kind) == 0
    }

    /// Deletes a record by `id`, returning whether it existed.
    pub fn remove(&self, kind: RecordKind, id: &str) -> bool {
        let Ok(mut collections) = self.collections.lock() else {
            return false;
        };
        let Some(docs) = collections.get_mut(&kind) else {
            return false;
        };
        let before = docs.len();
        docs.retain(|doc| doc.get_str("id").ok() != Some(id));
        docs.len() != before
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(AtomicOrdering::SeqCst)
    }

    /// Number of records returned by each `find_window` call, in call order.
    pub fn window_reads(&self) -> Vec<usize> {
        self.window_reads
            .lock()
            .map(|reads| reads.clone())
            .unwrap_or_default()
    }

    /// Makes the next `count` upserts fail with a duplicate-key error.
    pub fn fail_next_upserts_with_duplicate_key(&self, count: usize) {
        self.duplicate_key_failures
            .store(count, AtomicOrdering::SeqCst);
    }

    fn with_store_key(&self, mut doc: Document) -> Document {
        if !doc.contains_key(STORE_KEY_FIELD) {
            let key = self.next_key.fetch_add(1, AtomicOrdering::SeqCst);
            doc.insert(STORE_KEY_FIELD, Bson::Int64(key));
        }
        doc
    }

    fn take_duplicate_key_failure(&self) -> bool {
        self.duplicate_key_failures
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
    }

    fn collections(&self) -> Result<MutexGuard<'_, HashMap<RecordKind, Vec<Document>>>, SyncError> {
        self.collections
            .lock()
            .map_err(|e| SyncError::Store(format!("Memory store mutex poisoned: {}", e)))
    }

    fn matching(&self, kind: RecordKind, filter: &Filter) -> Result<Vec<Document>, SyncError> {
        Ok(self
            .collections()?
            .get(&kind)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert(&self, kind: RecordKind, record: &Record) -> Result<UpsertOutcome, SyncError> {
        self.upsert_calls.fetch_add(1, AtomicOrdering::SeqCst);
        if self.take_duplicate_key_failure() {
            return Err(SyncError::DuplicateKey(format!(
                "E11000 duplicate key error on id {}",
                record.id()
            )));
        }

        let mut collections = self.collections()?;
        let docs = collections.entry(kind).or_default();
        let existing = docs
            .iter_mut()
            .find(|doc| doc.get_str("id").ok() == Some(record.id()));

        match existing {
            Some(doc) => {
                let key = doc.get(STORE_KEY_FIELD).cloned();
                let mut replacement = record.body().clone();
                if let Some(key) = key {
                    replacement.insert(STORE_KEY_FIELD, key);
                }
                *doc = replacement;
                Ok(UpsertOutcome::Replaced)
            }
            None => {
                let mut body = record.body().clone();
                body.remove(STORE_KEY_FIELD);
                docs.push(self.with_store_key(body));
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn find_one(
        &self,
        kind: RecordKind,
        filter: &Filter,
    ) -> Result<Option<Record>, SyncError> {
        self.lookups.fetch_add(1, AtomicOrdering::SeqCst);
        self.matching(kind, filter)?
            .into_iter()
            .next()
            .map(Record::from_document)
            .transpose()
    }

    async fn find_window(
        &self,
        kind: RecordKind,
        filter: &Filter,
        window: &Window,
    ) -> Result<Vec<Record>, SyncError> {
        let mut docs = self.matching(kind, filter)?;
        docs.sort_by(|a, b| compare_keys(a.get(STORE_KEY_FIELD), b.get(STORE_KEY_FIELD)));

        let limit = window.limit() as usize;
        let selected: Vec<Document> = match window {
            Window::Offset { skip, .. } => docs
                .into_iter()
                .skip(*skip as usize)
                .take(limit)
                .collect(),
            Window::After { key, .. } => docs
                .into_iter()
                .filter(|doc| match key {
                    Some(key) => compare_keys(doc.get(STORE_KEY_FIELD), Some(key)) == Ordering::Greater,
                    None => true,
                })
                .take(limit)
                .collect(),
        };

        self.window_reads
            .lock()
            .map_err(|e| SyncError::Store(format!("Memory store mutex poisoned: {}", e)))?
            .push(selected.len());

        selected.into_iter().map(Record::from_document).collect()
    }

    async fn count(&self, kind: RecordKind, filter: &Filter) -> Result<u64, SyncError> {
        Ok(self.matching(kind, filter)?.len() as u64)
    }

    async fn earliest_created_at(
        &self,
        kind: RecordKind,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self
            .matching(kind, &Filter::new())?
            .iter()
            .filter_map(|doc| doc.get_datetime(CREATED_AT_FIELD).ok())
            .map(|dt| dt.to_chrono())
            .min())
    }

    async fn monthly_totals(
        &self,
        kind: RecordKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MonthlyTotal>, SyncError> {
        let mut groups: BTreeMap<(i32, u32, Option<String>), (i64, u64)> = BTreeMap::new();

        for doc in self.matching(kind, &Filter::new())? {
            let Ok(created_at) = doc.get_datetime(CREATED_AT_FIELD) else {
                continue;
            };
            let created_at = created_at.to_chrono();
            if created_at < start || created_at > end {
                continue;
            }
            let entry_type = match lookup_path(&doc, "platform_data.type") {
                Some(Bson::String(value)) => Some(value.clone()),
                _ => None,
            };
            let amount = lookup_path(&doc, "platform_data.amount")
                .and_then(minor_units)
                .unwrap_or(0);

            let group = groups
                .entry((created_at.year(), created_at.month(), entry_type))
                .or_insert((0, 0));
            group.0 += amount;
            group.1 += 1;
        }

        Ok(groups
            .into_iter()
            .map(|((year, month, entry_type), (total, count))| MonthlyTotal {
                year,
                month,
                entry_type,
                total,
                count,
            })
            .collect())
    }

    async fn health_check(&self) -> Result<(), SyncError> {
        self.collections().map(|_| ())
    }
}

fn compare_keys(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (Some(Bson::Int64(a)), Some(Bson::Int64(b))) => a.cmp(b),
        (Some(Bson::Int32(a)), Some(Bson::Int32(b))) => a.cmp(b),
        (Some(Bson::String(a)), Some(Bson::String(b))) => a.cmp(b),
        (Some(Bson::ObjectId(a)), Some(Bson::ObjectId(b))) => a.bytes().cmp(&b.bytes()),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn record(id: &str) -> Record {
        Record::from_document(doc! { "id": id, "status": "success" }).unwrap()
    }

    #[tokio::test]
    async fn upsert_assigns_keys_and_replaces_in_place() {
        let store = MemoryStore::new();
        let kind = RecordKind::Orders;

        assert_eq!(store.upsert(kind, &record("a")).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(kind, &record("b")).await.unwrap(), UpsertOutcome::Inserted);

        let updated = Record::from_document(doc! { "id": "a", "status": "refunded" }).unwrap();
        assert_eq!(store.upsert(kind, &updated).await.unwrap(), UpsertOutcome::Replaced);

        let records = store.records(kind);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status(), Some("refunded"));
        assert_eq!(records[0].store_key(), Some(&Bson::Int64(1)));
        assert_eq!(store.upsert_calls(), 3);
    }

    #[tokio::test]
    async fn keyset_windows_resume_after_the_last_key() {
        let store = MemoryStore::new();
        store.seed(
            RecordKind::Orders,
            (0..5).map(|i| record(&format!("o{}", i))).collect(),
        );

        let first = store
            .find_window(RecordKind::Orders, &Filter::new(), &Window::After { key: None, limit: 2 })
            .await
            .unwrap();
        let last = first.last().and_then(|r| r.store_key()).cloned();
        let second = store
            .find_window(RecordKind::Orders, &Filter::new(), &Window::After { key: last, limit: 2 })
            .await
            .unwrap();

        assert_eq!(second.iter().map(|r| r.id()).collect::<Vec<_>>(), vec!["o2", "o3"]);
        assert_eq!(store.window_reads(), vec![2, 2]);
    }

    #[tokio::test]
    async fn injected_duplicate_key_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_upserts_with_duplicate_key(1);

        let err = store.upsert(RecordKind::Orders, &record("a")).await.unwrap_err();
        assert!(matches!(err, SyncError::DuplicateKey(_)));
        assert!(store.upsert(RecordKind::Orders, &record("a")).await.is_ok());
    }
}
