//! Services module for payments-sync.

pub mod database;
pub mod memory;
pub mod metrics;
pub mod rutter;
pub mod store;

pub use database::MongoStore;
pub use memory::MemoryStore;
pub use rutter::{
    FetcherFactory, MockPageFetcher, Page, PageFetcher, PageQuery, RutterClient, RutterClients,
};
pub use store::{MonthlyTotal, RecordStore, UpsertOutcome, Window, WindowMode};
