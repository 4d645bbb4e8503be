//! Payments Sync - imports aggregated payment records and reconciles them across gateways.

pub mod config;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod jobs;
pub mod models;
pub mod reconcile;
pub mod reports;
pub mod services;
pub mod startup;
