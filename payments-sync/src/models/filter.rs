//! Equality filters over record fields: a conjunction of exact matches and
//! disjunctions. Rendered as a MongoDB query or evaluated in memory.

use super::record::lookup_path;
use mongodb::bson::{doc, Bson, Document};

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals { path: String, value: String },
    /// Matches when any `(path, value)` pair matches. Empty matches nothing.
    AnyOf(Vec<(String, String)>),
}

impl Condition {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Condition::Equals { path, value } => field_equals(doc, path, value),
            Condition::AnyOf(pairs) => pairs
                .iter()
                .any(|(path, value)| field_equals(doc, path, value)),
        }
    }
}

fn field_equals(doc: &Document, path: &str, value: &str) -> bool {
    matches!(lookup_path(doc, path), Some(Bson::String(found)) if found == value)
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push(Condition::Equals {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    pub fn any_of(mut self, pairs: Vec<(String, String)>) -> Self {
        self.conditions.push(Condition::AnyOf(pairs));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|condition| condition.matches(doc))
    }

    pub fn to_document(&self) -> Document {
        let mut query = Document::new();
        let mut disjunctions = Vec::new();

        for condition in &self.conditions {
            match condition {
                Condition::Equals { path, value } => {
                    query.insert(path.clone(), value.clone());
                }
                Condition::AnyOf(pairs) if pairs.is_empty() => {
                    disjunctions.push(doc! { "_id": { "$exists": false } });
                }
                Condition::AnyOf(pairs) => {
                    let branches: Vec<Bson> = pairs
                        .iter()
                        .map(|(path, value)| {
                            let mut branch = Document::new();
                            branch.insert(path.clone(), value.clone());
                            Bson::Document(branch)
                        })
                        .collect();
                    disjunctions.push(doc! { "$or": branches });
                }
            }
        }

        match disjunctions.len() {
            0 => {}
            1 => {
                if let Some(Bson::Array(branches)) = disjunctions.remove(0).remove("$or") {
                    query.insert("$or", branches);
                } else {
                    query.insert("_id", doc! { "$exists": false });
                }
            }
            _ => {
                query.insert("$and", disjunctions);
            }
        }

        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt_doc() -> Document {
        doc! {
            "id": "A",
            "gateway": "paypal",
            "platform_data": { "receipt": { "transaction_id": "X1" } }
        }
    }

    #[test]
    fn equality_and_disjunction_render_as_mongo_query() {
        let filter = Filter::new().eq("gateway", "paypal").any_of(vec![
            ("platform_data.receipt.transaction_id".to_string(), "X1".to_string()),
            ("platform_data.receipt.refund_transaction_id".to_string(), "X1".to_string()),
        ]);

        assert_eq!(
            filter.to_document(),
            doc! {
                "gateway": "paypal",
                "$or": [
                    { "platform_data.receipt.transaction_id": "X1" },
                    { "platform_data.receipt.refund_transaction_id": "X1" },
                ]
            }
        );
    }

    #[test]
    fn multiple_disjunctions_are_anded() {
        let filter = Filter::new()
            .any_of(vec![("a".to_string(), "1".to_string())])
            .any_of(vec![("b".to_string(), "2".to_string())]);

        assert_eq!(
            filter.to_document(),
            doc! { "$and": [ { "$or": [ { "a": "1" } ] }, { "$or": [ { "b": "2" } ] } ] }
        );
    }

    #[test]
    fn in_memory_evaluation_follows_paths() {
        let doc = receipt_doc();
        assert!(Filter::new().matches(&doc));
        assert!(Filter::new().eq("gateway", "paypal").matches(&doc));
        assert!(!Filter::new().eq("gateway", "Payflow Gateway").matches(&doc));
        assert!(Filter::new()
            .any_of(vec![
                ("platform_id".to_string(), "X1".to_string()),
                ("platform_data.receipt.transaction_id".to_string(), "X1".to_string()),
            ])
            .matches(&doc));
    }

    #[test]
    fn empty_disjunction_matches_nothing() {
        let filter = Filter::new().any_of(Vec::new());
        assert!(!filter.matches(&receipt_doc()));
        assert_eq!(filter.to_document(), doc! { "_id": { "$exists": false } });
    }
}
