//! HTTP handlers: health checks, metrics and job triggers.

pub mod health;
pub mod jobs;

pub use health::{health_check, metrics_endpoint, readiness_check};
pub use jobs::{trigger_import, trigger_reconciliation, trigger_summary, ImportParams};
