//! MongoDB-backed store checks.
//!
//! Require a running server: set `TEST_MONGODB_URI` and run with
//! `cargo test -- --ignored`.

mod common;

use common::*;
use payments_sync::ingest::BatchUpserter;
use payments_sync::jobs::run_reconciliation;
use payments_sync::models::{BuiltinRule, Filter, RecordKind};
use payments_sync::services::{MongoStore, RecordStore, UpsertOutcome, Window, WindowMode};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

async fn scratch_store() -> (MongoStore, String, String) {
    let uri = std::env::var("TEST_MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let database = format!("payments_sync_test_{}", nanos);

    let store = MongoStore::connect(&uri, &database)
        .await
        .expect("Failed to connect to MongoDB");
    store.initialize_indexes().await.unwrap();
    (store, uri, database)
}

async fn drop_database(uri: &str, database: &str) {
    let client = mongodb::Client::with_uri_str(uri).await.unwrap();
    client.database(database).drop(None).await.unwrap();
}

#[tokio::test]
#[ignore = "Requires MongoDB (TEST_MONGODB_URI)"]
async fn upsert_is_idempotent_by_external_id() {
    let (store, uri, database) = scratch_store().await;

    let first = store
        .upsert(RecordKind::Orders, &order("ord_1", "5001"))
        .await
        .unwrap();
    let second = store
        .upsert(RecordKind::Orders, &order("ord_1", "5002"))
        .await
        .unwrap();

    assert_eq!(first, UpsertOutcome::Inserted);
    assert_eq!(second, UpsertOutcome::Replaced);
    assert_eq!(store.count(RecordKind::Orders, &Filter::new()).await.unwrap(), 1);

    let stored = store
        .find_one(RecordKind::Orders, &Filter::new().eq("id", "ord_1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.platform_id().as_deref(), Some("5002"));

    drop_database(&uri, &database).await;
}

#[tokio::test]
#[ignore = "Requires MongoDB (TEST_MONGODB_URI)"]
async fn windows_cover_every_record_in_both_modes() {
    let (store, uri, database) = scratch_store().await;
    let shared: Arc<dyn RecordStore> = Arc::new(store);

    let mut batch = BatchUpserter::new(shared.clone(), RecordKind::Orders, 3);
    for i in 0..7 {
        batch
            .accept(order(&format!("ord_{}", i), &i.to_string()))
            .await
            .unwrap();
    }
    assert_eq!(batch.finish().await.unwrap().records, 7);

    for mode in [WindowMode::Keyset, WindowMode::Offset] {
        let mut window = Window::first(mode, 3);
        let mut seen = Vec::new();
        loop {
            let records = shared
                .find_window(RecordKind::Orders, &Filter::new(), &window)
                .await
                .unwrap();
            if records.is_empty() {
                break;
            }
            window = match window {
                Window::Offset { skip, limit } => Window::Offset {
                    skip: skip + records.len() as u64,
                    limit,
                },
                Window::After { limit, .. } => Window::After {
                    key: records.last().and_then(|r| r.store_key().cloned()),
                    limit,
                },
            };
            seen.extend(records.iter().map(|r| r.id().to_string()));
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 7, "mode {}", mode);
    }

    drop_database(&uri, &database).await;
}

#[tokio::test]
#[ignore = "Requires MongoDB (TEST_MONGODB_URI)"]
async fn receipt_lookup_matches_refund_ids() {
    let (store, uri, database) = scratch_store().await;
    let shared: Arc<dyn RecordStore> = Arc::new(store);
    for record in [
        paypal("A", "X1", Some("R1")),
        payflow("B", "R1"),
        payflow("C", "ZZ"),
    ] {
        shared.upsert(RecordKind::Transactions, &record).await.unwrap();
    }
    let dir = tempfile::tempdir().unwrap();

    let outcome = run_reconciliation(shared, &settings(dir.path()), BuiltinRule::PayflowToPaypal)
        .await
        .unwrap();

    assert_eq!(outcome.report.matched, 1);
    assert_eq!(outcome.report.missing.ids(), vec!["C"]);

    drop_database(&uri, &database).await;
}
