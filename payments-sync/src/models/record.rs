//! Semi-structured records mirrored from the aggregation API.

use crate::error::{MalformedRecord, SyncError};
use chrono::{DateTime, SecondsFormat, Utc};
use mongodb::bson::{self, Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ID_FIELD: &str = "id";
pub const STORE_KEY_FIELD: &str = "_id";
pub const CREATED_AT_FIELD: &str = "created_at";
const TIMESTAMP_FIELDS: [&str; 2] = [CREATED_AT_FIELD, "updated_at"];

/// The remote collections we mirror. The name doubles as API path segment,
/// response array key and store collection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Transactions,
    Orders,
    Payouts,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::Transactions,
        RecordKind::Orders,
        RecordKind::Payouts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transactions => "transactions",
            Self::Orders => "orders",
            Self::Payouts => "payouts",
        }
    }

    pub fn collection(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SyncError::Config(format!("unknown record kind: {}", s)))
    }
}

/// A document with a mandatory external `id`. Everything else stays in the
/// body as received and is read through typed accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: String,
    body: Document,
}

impl Record {
    pub fn from_document(body: Document) -> Result<Self, SyncError> {
        let id = body
            .get(ID_FIELD)
            .and_then(key_text)
            .ok_or_else(|| {
                MalformedRecord::new(
                    body.get(STORE_KEY_FIELD)
                        .map(|key| key.to_string())
                        .unwrap_or_else(|| "<unknown>".to_string()),
                    "record has no `id`",
                )
            })?;
        Ok(Self { id, body })
    }

    /// Builds a record from an API payload, storing RFC 3339 timestamps as
    /// BSON dates.
    pub fn from_json(value: serde_json::Value) -> Result<Self, SyncError> {
        let mut body = bson::to_document(&value)?;
        for field in TIMESTAMP_FIELDS {
            let parsed = match body.get(field) {
                Some(Bson::String(raw)) => DateTime::parse_from_rfc3339(raw).ok(),
                _ => None,
            };
            if let Some(parsed) = parsed {
                body.insert(
                    field,
                    Bson::DateTime(bson::DateTime::from_chrono(parsed.with_timezone(&Utc))),
                );
            }
        }
        Self::from_document(body)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn body(&self) -> &Document {
        &self.body
    }

    pub fn into_body(self) -> Document {
        self.body
    }

    /// The store-assigned `_id`, present on records read back from a store.
    pub fn store_key(&self) -> Option<&Bson> {
        self.body.get(STORE_KEY_FIELD)
    }

    /// Resolves a dotted path such as `platform_data.receipt.transaction_id`.
    pub fn get_path(&self, path: &str) -> Option<&Bson> {
        lookup_path(&self.body, path)
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.get_path(path).and_then(key_text)
    }

    pub fn platform_id(&self) -> Option<String> {
        self.text("platform_id")
    }

    pub fn gateway(&self) -> Option<&str> {
        self.body.get_str("gateway").ok()
    }

    pub fn status(&self) -> Option<&str> {
        self.body.get_str("status").ok()
    }

    pub fn record_type(&self) -> Option<&str> {
        self.body.get_str("type").ok()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self.body.get(CREATED_AT_FIELD) {
            Some(Bson::DateTime(dt)) => Some(dt.to_chrono()),
            Some(Bson::String(raw)) => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// The record's `date`, falling back to its creation time.
    pub fn date(&self) -> Option<String> {
        self.text("date").or_else(|| {
            self.created_at()
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        })
    }

    pub fn platform_data(&self) -> PlatformData {
        PlatformData::from_bson(self.body.get("platform_data"))
    }
}

/// Gateway-specific payload carried under `platform_data`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformData {
    /// Commerce-platform transaction: parent order and the payment gateway
    /// receipt, when the gateway attached one.
    Commerce {
        order_id: Option<String>,
        receipt: Option<GatewayReceipt>,
    },
    /// Balance-ledger entry with a type tag and an amount in minor units.
    Balance {
        entry_type: Option<String>,
        amount: Option<i64>,
    },
    Opaque(Document),
    Absent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayReceipt {
    pub transaction_id: Option<String>,
    pub refund_transaction_id: Option<String>,
}

impl GatewayReceipt {
    fn from_document(doc: &Document) -> Self {
        Self {
            transaction_id: doc.get("transaction_id").and_then(key_text),
            refund_transaction_id: doc.get("refund_transaction_id").and_then(key_text),
        }
    }

    /// The id a counterpart is looked up by: the payment id, or the refund
    /// id when the receipt carries no payment id.
    pub fn lookup_id(&self) -> Option<&str> {
        self.transaction_id
            .as_deref()
            .or(self.refund_transaction_id.as_deref())
    }
}

impl PlatformData {
    pub fn from_bson(value: Option<&Bson>) -> Self {
        match value {
            None | Some(Bson::Null) => PlatformData::Absent,
            Some(Bson::Document(doc)) => {
                if doc.contains_key("receipt") || doc.contains_key("order_id") {
                    PlatformData::Commerce {
                        order_id: doc.get("order_id").and_then(key_text),
                        receipt: match doc.get("receipt") {
                            Some(Bson::Document(receipt)) => {
                                Some(GatewayReceipt::from_document(receipt))
                            }
                            _ => None,
                        },
                    }
                } else if doc.contains_key("type") && doc.contains_key("amount") {
                    PlatformData::Balance {
                        entry_type: doc.get_str("type").ok().map(str::to_owned),
                        amount: doc.get("amount").and_then(minor_units),
                    }
                } else {
                    PlatformData::Opaque(doc.clone())
                }
            }
            Some(other) => {
                let mut doc = Document::new();
                doc.insert("value", other.clone());
                PlatformData::Opaque(doc)
            }
        }
    }

    pub fn receipt(&self) -> Option<&GatewayReceipt> {
        match self {
            PlatformData::Commerce { receipt, .. } => receipt.as_ref(),
            _ => None,
        }
    }
}

/// Renders scalar identifiers as text. Empty strings count as absent.
pub fn key_text(value: &Bson) -> Option<String> {
    match value {
        Bson::String(s) if !s.is_empty() => Some(s.clone()),
        Bson::Int32(n) => Some(n.to_string()),
        Bson::Int64(n) => Some(n.to_string()),
        Bson::Double(f) if f.is_finite() && f.fract() == 0.0 => Some(format!("{}", *f as i64)),
        Bson::Double(f) if f.is_finite() => Some(f.to_string()),
        _ => None,
    }
}

pub(crate) fn minor_units(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.is_finite() => Some(f.round() as i64),
        _ => None,
    }
}

pub(crate) fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}
