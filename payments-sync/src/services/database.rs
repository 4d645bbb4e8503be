//! MongoDB-backed record store.

use super::metrics::record_store_query;
use super::store::{MonthlyTotal, RecordStore, UpsertOutcome, Window};
use crate::error::SyncError;
use crate::models::record::{minor_units, CREATED_AT_FIELD, ID_FIELD, STORE_KEY_FIELD};
use crate::models::{Filter, Record, RecordKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    options::{FindOneOptions, FindOptions, IndexOptions, ReplaceOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use std::time::Instant;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

impl MongoStore {
    #[instrument(skip(uri))]
    pub async fn connect(uri: &str, database: &str) -> Result<Self, SyncError> {
        info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            SyncError::Store(e.to_string())
        })?;
        let db = client.database(database);
        info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub fn collection(&self, kind: RecordKind) -> Collection<Document> {
        self.db.collection(kind.collection())
    }

    /// Creates the lookup and aggregation indexes. `id` is unique per
    /// collection.
    pub async fn initialize_indexes(&self) -> Result<(), SyncError> {
        info!("Creating MongoDB indexes for payments-sync");

        for kind in RecordKind::ALL {
            self.create_index(kind, doc! { ID_FIELD: 1 }, "id_idx", true)
                .await?;
        }

        let transactions = RecordKind::Transactions;
        for field in ["platform_id", "status", "gateway", "type", CREATED_AT_FIELD] {
            self.create_index(transactions, doc! { field: 1 }, &format!("{}_idx", field), false)
                .await?;
        }
        self.create_index(
            transactions,
            doc! { CREATED_AT_FIELD: 1, "platform_data.type": 1, "platform_data.amount": 1 },
            "created_at_type_amount_idx",
            false,
        )
        .await?;
        self.create_index(
            transactions,
            doc! { "platform_data.receipt.transaction_id": 1 },
            "receipt_transaction_id_idx",
            false,
        )
        .await?;
        self.create_index(
            transactions,
            doc! { "platform_data.receipt.refund_transaction_id": 1 },
            "receipt_refund_transaction_id_idx",
            false,
        )
        .await?;

        for field in ["platform_id", "status"] {
            self.create_index(RecordKind::Orders, doc! { field: 1 }, &format!("{}_idx", field), false)
                .await?;
        }

        self.create_index(RecordKind::Payouts, doc! { CREATED_AT_FIELD: 1 }, "created_at_idx", false)
            .await?;

        info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    async fn create_index(
        &self,
        kind: RecordKind,
        keys: Document,
        name: &str,
        unique: bool,
    ) -> Result<(), SyncError> {
        let index = IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .name(name.to_string())
                    .unique(unique)
                    .build(),
            )
            .build();

        self.collection(kind)
            .create_index(index, None)
            .await
            .map_err(|e| {
                tracing::error!(collection = %kind, index = %name, "Failed to create index: {}", e);
                SyncError::from(e)
            })?;
        Ok(())
    }

    /// Releases the connection pool. The store must not be used afterwards.
    pub async fn close(self) {
        self.client.shutdown().await;
        info!("MongoDB connection closed");
    }
}

#[async_trait]
impl RecordStore for MongoStore {
    async fn upsert(&self, kind: RecordKind, record: &Record) -> Result<UpsertOutcome, SyncError> {
        let started = Instant::now();
        let options = ReplaceOptions::builder().upsert(true).build();
        let result = self
            .collection(kind)
            .replace_one(doc! { ID_FIELD: record.id() }, record.body(), options)
            .await;
        record_store_query("upsert", started);

        let result = result?;
        Ok(if result.upserted_id.is_some() {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Replaced
        })
    }

    async fn find_one(
        &self,
        kind: RecordKind,
        filter: &Filter,
    ) -> Result<Option<Record>, SyncError> {
        let started = Instant::now();
        let found = self
            .collection(kind)
            .find_one(filter.to_document(), None)
            .await;
        record_store_query("find_one", started);

        found?.map(Record::from_document).transpose()
    }

    async fn find_window(
        &self,
        kind: RecordKind,
        filter: &Filter,
        window: &Window,
    ) -> Result<Vec<Record>, SyncError> {
        let mut query = filter.to_document();
        let mut options = FindOptions::builder()
            .sort(doc! { STORE_KEY_FIELD: 1 })
            .limit(i64::from(window.limit()))
            .build();

        match window {
            Window::Offset { skip, .. } => options.skip = Some(*skip),
            Window::After { key: Some(key), .. } => {
                query.insert(STORE_KEY_FIELD, doc! { "$gt": key.clone() });
            }
            Window::After { key: None, .. } => {}
        }

        let started = Instant::now();
        let cursor = self.collection(kind).find(query, options).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        record_store_query("find_window", started);

        documents.into_iter().map(Record::from_document).collect()
    }

    async fn count(&self, kind: RecordKind, filter: &Filter) -> Result<u64, SyncError> {
        let started = Instant::now();
        let count = self
            .collection(kind)
            .count_documents(filter.to_document(), None)
            .await;
        record_store_query("count", started);
        Ok(count?)
    }

    async fn earliest_created_at(
        &self,
        kind: RecordKind,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        let options = FindOneOptions::builder()
            .sort(doc! { CREATED_AT_FIELD: 1 })
            .build();
        let earliest = self
            .collection(kind)
            .find_one(doc! { CREATED_AT_FIELD: { "$type": "date" } }, options)
            .await?;

        Ok(earliest
            .and_then(|doc| doc.get_datetime(CREATED_AT_FIELD).ok().copied())
            .map(|dt| dt.to_chrono()))
    }

    async fn monthly_totals(
        &self,
        kind: RecordKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MonthlyTotal>, SyncError> {
        let pipeline = vec![
            doc! {
                "$match": {
                    CREATED_AT_FIELD: {
                        "$gte": BsonDateTime::from_chrono(start),
                        "$lte": BsonDateTime::from_chrono(end),
                    }
                }
            },
            doc! {
                "$group": {
                    "_id": {
                        "year": { "$year": "$created_at" },
                        "month": { "$month": "$created_at" },
                        "type": "$platform_data.type",
                    },
                    "total": { "$sum": "$platform_data.amount" },
                    "count": { "$sum": 1 },
                }
            },
            doc! { "$sort": { "_id.year": 1, "_id.month": 1, "_id.type": 1 } },
        ];

        let started = Instant::now();
        let cursor = self.collection(kind).aggregate(pipeline, None).await?;
        let groups: Vec<Document> = cursor.try_collect().await?;
        record_store_query("monthly_totals", started);

        groups.iter().map(parse_monthly_total).collect()
    }

    async fn health_check(&self) -> Result<(), SyncError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                SyncError::Store(e.to_string())
            })?;
        Ok(())
    }
}

fn parse_monthly_total(group: &Document) -> Result<MonthlyTotal, SyncError> {
    let key = group
        .get_document("_id")
        .map_err(|e| SyncError::Decode(format!("summary group without key: {}", e)))?;

    let year = key
        .get("year")
        .and_then(minor_units)
        .ok_or_else(|| SyncError::Decode("summary group without year".to_string()))?;
    let month = key
        .get("month")
        .and_then(minor_units)
        .ok_or_else(|| SyncError::Decode("summary group without month".to_string()))?;

    Ok(MonthlyTotal {
        year: year as i32,
        month: month as u32,
        entry_type: key.get_str("type").ok().map(str::to_owned),
        total: group.get("total").and_then(minor_units).unwrap_or(0),
        count: group.get("count").and_then(minor_units).unwrap_or(0) as u64,
    })
}
