//! Shared fixtures for payments-sync integration tests.

#![allow(dead_code)]

use payments_sync::config::{AccessTokens, RutterAuth, RutterConfig};
use payments_sync::jobs::JobSettings;
use payments_sync::models::{Record, RecordKind};
use payments_sync::services::{FetcherFactory, MemoryStore, RecordStore, RutterClients, WindowMode};
use payments_sync::startup::AppState;
use secrecy::Secret;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const API_VERSION: &str = "2023-03-14";
pub const AUTH_HEADER: &str = "Basic dGVzdDp0ZXN0";

pub fn rutter_config(base_url: &str) -> RutterConfig {
    let token = |value: &str| Some(Secret::new(value.to_string()));
    RutterConfig {
        base_url: base_url.to_string(),
        api_version: API_VERSION.to_string(),
        auth: RutterAuth::Header(Secret::new(AUTH_HEADER.to_string())),
        access_tokens: AccessTokens {
            transactions: token("tok_transactions"),
            orders: token("tok_orders"),
            payouts: token("tok_payouts"),
        },
        page_limit: 500,
        request_timeout: Duration::from_secs(5),
        retry_max_elapsed: None,
    }
}

pub fn settings(report_dir: &Path) -> JobSettings {
    JobSettings {
        batch_size: 500,
        window_size: 500,
        window_mode: WindowMode::Keyset,
        report_dir: report_dir.to_path_buf(),
    }
}

pub fn app_state(store: Arc<MemoryStore>, base_url: &str, report_dir: &Path) -> AppState {
    let store: Arc<dyn RecordStore> = store;
    let fetchers: Arc<dyn FetcherFactory> = Arc::new(RutterClients::new(rutter_config(base_url)));
    AppState::new(store, fetchers, settings(report_dir))
}

pub fn record(value: Value) -> Record {
    Record::from_json(value).expect("fixture record must have an id")
}

/// A successful paypal transaction carrying a gateway receipt.
pub fn paypal(id: &str, transaction_id: &str, refund_transaction_id: Option<&str>) -> Record {
    let mut receipt = json!({ "transaction_id": transaction_id });
    if let Some(refund) = refund_transaction_id {
        receipt["refund_transaction_id"] = json!(refund);
    }
    record(json!({
        "id": id,
        "gateway": "paypal",
        "status": "success",
        "type": "sale",
        "created_at": "2024-03-05T10:00:00Z",
        "platform_data": { "order_id": 1000, "receipt": receipt }
    }))
}

/// A successful paypal transaction belonging to an order.
pub fn paypal_for_order(id: &str, order_id: i64) -> Record {
    record(json!({
        "id": id,
        "gateway": "paypal",
        "status": "success",
        "type": "sale",
        "platform_data": { "order_id": order_id, "receipt": { "transaction_id": format!("PP-{}", id) } }
    }))
}

/// A successful Payflow Gateway transaction.
pub fn payflow(id: &str, platform_id: &str) -> Record {
    record(json!({
        "id": id,
        "gateway": "Payflow Gateway",
        "status": "success",
        "type": "sale",
        "created_at": "2024-03-06T11:00:00Z",
        "platform_id": platform_id
    }))
}

pub fn order(id: &str, platform_id: &str) -> Record {
    record(json!({ "id": id, "platform_id": platform_id, "status": "paid" }))
}

/// A balance-ledger transaction.
pub fn balance(id: &str, created_at: &str, entry_type: &str, amount: i64) -> Record {
    record(json!({
        "id": id,
        "created_at": created_at,
        "platform_data": { "type": entry_type, "amount": amount }
    }))
}

/// Raw API payload for one page of `kind`.
pub fn page_body(kind: RecordKind, ids: &[&str], next_cursor: Option<&str>) -> Value {
    let records: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "platform_id": format!("plat-{}", id),
                "status": "success",
                "created_at": "2024-01-15T09:30:00Z",
                "platform_data": { "type": "charge", "amount": 1000 }
            })
        })
        .collect();

    let mut body = json!({ "next_cursor": next_cursor });
    body[kind.as_str()] = Value::Array(records);
    body
}
