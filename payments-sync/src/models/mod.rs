//! Domain models for payments-sync.

pub mod filter;
pub mod record;
pub mod rule;

pub use filter::{Condition, Filter};
pub use record::{key_text, GatewayReceipt, PlatformData, Record, RecordKind};
pub use rule::{
    BuiltinRule, KeyExtractor, MatchRule, ReportLayout, GATEWAY_PAYFLOW, GATEWAY_PAYPAL,
    STATUS_SUCCESS,
};

/// Serializes a run duration as fractional seconds.
pub(crate) fn serialize_secs<S>(duration: &std::time::Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}
