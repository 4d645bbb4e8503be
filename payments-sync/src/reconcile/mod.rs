//! Store-side reconciliation: scan a source collection and report records
//! without a counterpart.

pub mod driver;
pub mod matcher;

pub use driver::{MissingEntry, MissingSet, ReconciliationDriver, ReconciliationReport};
pub use matcher::{Classification, Matcher};
