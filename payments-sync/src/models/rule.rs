//! Match rules: which candidates to scan, how to derive their lookup keys,
//! and where to look for a counterpart.

use super::filter::Filter;
use super::record::{PlatformData, Record, RecordKind};
use crate::error::{MalformedRecord, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const GATEWAY_PAYPAL: &str = "paypal";
pub const GATEWAY_PAYFLOW: &str = "Payflow Gateway";
pub const STATUS_SUCCESS: &str = "success";

const RECEIPT_TRANSACTION_ID: &str = "platform_data.receipt.transaction_id";
const RECEIPT_REFUND_TRANSACTION_ID: &str = "platform_data.receipt.refund_transaction_id";

/// Derives lookup values from a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExtractor {
    /// The candidate's own `platform_id`.
    PlatformId,
    /// `platform_data.receipt.transaction_id`, or `refund_transaction_id`
    /// when the receipt has no payment id.
    ReceiptIds,
    /// `platform_data.order_id`, rendered as text.
    OrderId,
}

impl KeyExtractor {
    /// Returns the lookup values, possibly none. Fails when the nested
    /// structure the extractor reads from is missing, or when an order
    /// reference lacks its `order_id`.
    pub fn extract(&self, record: &Record) -> Result<Vec<String>, MalformedRecord> {
        match self {
            KeyExtractor::PlatformId => Ok(record.platform_id().into_iter().collect()),
            KeyExtractor::ReceiptIds => record
                .platform_data()
                .receipt()
                .map(|receipt| receipt.lookup_id().map(str::to_string).into_iter().collect())
                .ok_or_else(|| MalformedRecord::new(record.id(), "no receipt in platform_data")),
            KeyExtractor::OrderId => match record.platform_data() {
                PlatformData::Commerce {
                    order_id: Some(order_id),
                    ..
                } => Ok(vec![order_id]),
                PlatformData::Commerce { order_id: None, .. } => {
                    Err(MalformedRecord::new(record.id(), "no order_id in platform_data"))
                }
                _ => Err(MalformedRecord::new(
                    record.id(),
                    "platform_data carries no order reference",
                )),
            },
        }
    }
}

/// CSV layout of a rule's missing-set report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLayout {
    pub file_name: &'static str,
    pub header: &'static str,
    /// Append `type,status,date` after the key column.
    pub detailed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchRule {
    pub name: String,
    pub source_kind: RecordKind,
    pub source_filter: Filter,
    pub extractor: KeyExtractor,
    pub target_kind: RecordKind,
    pub target_filter: Filter,
    /// Target fields compared against every extracted value; any match counts.
    pub target_fields: Vec<String>,
    pub report: ReportLayout,
}

impl MatchRule {
    /// The counterpart query for a set of extracted keys, or `None` when
    /// there is nothing to look up.
    pub fn lookup_filter(&self, keys: &[String]) -> Option<Filter> {
        if keys.is_empty() || self.target_fields.is_empty() {
            return None;
        }
        let pairs = keys
            .iter()
            .flat_map(|key| {
                self.target_fields
                    .iter()
                    .map(move |field| (field.clone(), key.clone()))
            })
            .collect();
        Some(self.target_filter.clone().any_of(pairs))
    }
}

/// The reconciliations the business runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BuiltinRule {
    /// Successful paypal transactions whose parent order was never imported.
    Orders,
    /// Successful paypal transactions without a Payflow Gateway counterpart.
    PaypalToPayflow,
    /// Successful Payflow Gateway transactions without a paypal counterpart.
    PayflowToPaypal,
}

impl BuiltinRule {
    pub const ALL: [BuiltinRule; 3] = [
        BuiltinRule::Orders,
        BuiltinRule::PaypalToPayflow,
        BuiltinRule::PayflowToPaypal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::PaypalToPayflow => "paypal-to-payflow",
            Self::PayflowToPaypal => "payflow-to-paypal",
        }
    }

    pub fn rule(&self) -> MatchRule {
        let successful = |gateway: &str| {
            Filter::new()
                .eq("gateway", gateway)
                .eq("status", STATUS_SUCCESS)
        };

        match self {
            Self::Orders => MatchRule {
                name: self.as_str().to_string(),
                source_kind: RecordKind::Transactions,
                source_filter: successful(GATEWAY_PAYPAL),
                extractor: KeyExtractor::OrderId,
                target_kind: RecordKind::Orders,
                target_filter: Filter::new(),
                target_fields: vec!["platform_id".to_string()],
                report: ReportLayout {
                    file_name: "missing_orders.csv",
                    header: "order_id",
                    detailed: false,
                },
            },
            Self::PaypalToPayflow => MatchRule {
                name: self.as_str().to_string(),
                source_kind: RecordKind::Transactions,
                source_filter: successful(GATEWAY_PAYPAL),
                extractor: KeyExtractor::ReceiptIds,
                target_kind: RecordKind::Transactions,
                target_filter: Filter::new().eq("gateway", GATEWAY_PAYFLOW),
                target_fields: vec!["platform_id".to_string()],
                report: ReportLayout {
                    file_name: "missing_paypal_transactions.csv",
                    header: "paypalTransactionId,type,status,date",
                    detailed: true,
                },
            },
            Self::PayflowToPaypal => MatchRule {
                name: self.as_str().to_string(),
                source_kind: RecordKind::Transactions,
                source_filter: successful(GATEWAY_PAYFLOW),
                extractor: KeyExtractor::PlatformId,
                target_kind: RecordKind::Transactions,
                target_filter: Filter::new().eq("gateway", GATEWAY_PAYPAL),
                target_fields: vec![
                    RECEIPT_TRANSACTION_ID.to_string(),
                    RECEIPT_REFUND_TRANSACTION_ID.to_string(),
                ],
                report: ReportLayout {
                    file_name: "missing_ghost_transactions.csv",
                    header: "paypalTransactionId,type,status,date",
                    detailed: true,
                },
            },
        }
    }
}

impl fmt::Display for BuiltinRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuiltinRule {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuiltinRule::ALL
            .into_iter()
            .find(|rule| rule.as_str() == s)
            .ok_or_else(|| SyncError::Config(format!("unknown reconciliation rule: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Condition;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_json(value).unwrap()
    }

    #[test]
    fn receipt_extraction_prefers_the_payment_id() {
        let candidate = record(json!({
            "id": "A",
            "platform_data": { "receipt": { "transaction_id": "X1", "refund_transaction_id": "R1" } }
        }));
        assert_eq!(
            KeyExtractor::ReceiptIds.extract(&candidate).unwrap(),
            vec!["X1".to_string()]
        );
    }

    #[test]
    fn receipt_extraction_falls_back_to_the_refund_id() {
        let candidate = record(json!({
            "id": "A",
            "platform_data": { "receipt": { "transaction_id": "", "refund_transaction_id": "R1" } }
        }));
        assert_eq!(
            KeyExtractor::ReceiptIds.extract(&candidate).unwrap(),
            vec!["R1".to_string()]
        );
    }

    #[test]
    fn receipt_extraction_fails_without_receipt() {
        let candidate = record(json!({ "id": "A", "gateway": "paypal", "platform_data": {} }));
        let err = KeyExtractor::ReceiptIds.extract(&candidate).unwrap_err();
        assert_eq!(err.record_id, "A");
    }

    #[test]
    fn empty_receipt_yields_no_keys() {
        let candidate = record(json!({
            "id": "A",
            "platform_data": { "receipt": { "transaction_id": "" } }
        }));
        assert!(KeyExtractor::ReceiptIds.extract(&candidate).unwrap().is_empty());
    }

    #[test]
    fn order_id_is_rendered_as_text() {
        let candidate = record(json!({ "id": "A", "platform_data": { "order_id": 5001 } }));
        assert_eq!(
            KeyExtractor::OrderId.extract(&candidate).unwrap(),
            vec!["5001".to_string()]
        );

        let balance = record(json!({ "id": "B", "platform_data": { "type": "charge", "amount": 100 } }));
        assert!(KeyExtractor::OrderId.extract(&balance).is_err());
    }

    #[test]
    fn order_extraction_fails_without_order_id() {
        let candidate = record(json!({
            "id": "A",
            "platform_data": { "receipt": { "transaction_id": "X1" } }
        }));
        let err = KeyExtractor::OrderId.extract(&candidate).unwrap_err();
        assert_eq!(err.record_id, "A");
    }

    #[test]
    fn platform_id_extraction_tolerates_absence() {
        let candidate = record(json!({ "id": "A" }));
        assert!(KeyExtractor::PlatformId.extract(&candidate).unwrap().is_empty());
    }

    #[test]
    fn lookup_filter_crosses_keys_with_target_fields() {
        let rule = BuiltinRule::PayflowToPaypal.rule();
        let filter = rule.lookup_filter(&["X1".to_string()]).unwrap();

        assert_eq!(
            filter.conditions(),
            &[
                Condition::Equals {
                    path: "gateway".to_string(),
                    value: GATEWAY_PAYPAL.to_string(),
                },
                Condition::AnyOf(vec![
                    (RECEIPT_TRANSACTION_ID.to_string(), "X1".to_string()),
                    (RECEIPT_REFUND_TRANSACTION_ID.to_string(), "X1".to_string()),
                ]),
            ]
        );
        assert!(rule.lookup_filter(&[]).is_none());
    }

    #[test]
    fn rule_names_round_trip_through_from_str() {
        for builtin in BuiltinRule::ALL {
            assert_eq!(builtin.as_str().parse::<BuiltinRule>().unwrap(), builtin);
        }
        assert!("ghosts".parse::<BuiltinRule>().is_err());
    }

    #[test]
    fn builtin_rules_scan_successful_transactions() {
        for builtin in BuiltinRule::ALL {
            let rule = builtin.rule();
            assert_eq!(rule.name, builtin.as_str());
            assert_eq!(rule.source_kind, RecordKind::Transactions);
            assert!(rule.source_filter.conditions().contains(&Condition::Equals {
                path: "status".to_string(),
                value: STATUS_SUCCESS.to_string(),
            }));
        }
    }
}
