use crate::error::{MalformedRecord, SyncError};
use crate::models::{MatchRule, Record};
use crate::services::RecordStore;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Matched(Record),
    /// No counterpart for any of the extracted keys. The key list may be
    /// empty when the candidate carried the structure but no values.
    Missing(Vec<String>),
    /// The candidate lacks the nested structure the rule reads from. It is
    /// neither matched nor reported missing.
    Skipped(MalformedRecord),
}

impl Classification {
    pub fn outcome(&self) -> &'static str {
        match self {
            Classification::Matched(_) => "matched",
            Classification::Missing(_) => "missing",
            Classification::Skipped(_) => "skipped",
        }
    }
}

/// Looks up counterparts one candidate at a time.
#[derive(Clone)]
pub struct Matcher {
    store: Arc<dyn RecordStore>,
}

impl Matcher {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// First target record equal to any extracted key on any target field.
    ///
    /// Errors with `MalformedRecord` when the candidate lacks the structure
    /// the extractor reads from.
    pub async fn find_counterpart(
        &self,
        candidate: &Record,
        rule: &MatchRule,
    ) -> Result<Option<Record>, SyncError> {
        let keys = rule.extractor.extract(candidate)?;
        self.lookup(rule, &keys).await
    }

    pub async fn classify(
        &self,
        candidate: &Record,
        rule: &MatchRule,
    ) -> Result<Classification, SyncError> {
        let keys = match rule.extractor.extract(candidate) {
            Ok(keys) => keys,
            Err(malformed) => {
                tracing::warn!(
                    rule = %rule.name,
                    record_id = %malformed.record_id,
                    reason = %malformed.reason,
                    "Skipping malformed candidate"
                );
                return Ok(Classification::Skipped(malformed));
            }
        };

        Ok(match self.lookup(rule, &keys).await? {
            Some(counterpart) => Classification::Matched(counterpart),
            None => Classification::Missing(keys),
        })
    }

    async fn lookup(&self, rule: &MatchRule, keys: &[String]) -> Result<Option<Record>, SyncError> {
        match rule.lookup_filter(keys) {
            Some(filter) => self.store.find_one(rule.target_kind, &filter).await,
            None => Ok(None),
        }
    }
}
