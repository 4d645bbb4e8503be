//! service-core: configuration, error mapping and tracing shared by the
//! payments-sync binaries.
pub mod config;
pub mod error;
pub mod observability;

pub use config::Config;
pub use error::AppError;
