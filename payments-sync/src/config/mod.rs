//! Configuration module for payments-sync.

use crate::models::RecordKind;
use crate::services::WindowMode;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RUTTER_BASE_URL: &str = "https://production.rutterapi.com/versioned";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub mongodb: MongoConfig,
    pub rutter: RutterConfig,
    pub ingest: IngestConfig,
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

/// How requests to the aggregation API are authorized.
#[derive(Debug, Clone)]
pub enum RutterAuth {
    /// Raw `Authorization` header value, bearer or pre-encoded basic.
    Header(Secret<String>),
    Basic {
        client_id: String,
        client_secret: Secret<String>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct AccessTokens {
    pub transactions: Option<Secret<String>>,
    pub orders: Option<Secret<String>>,
    pub payouts: Option<Secret<String>>,
}

impl AccessTokens {
    pub fn for_kind(&self, kind: RecordKind) -> Option<&Secret<String>> {
        match kind {
            RecordKind::Transactions => self.transactions.as_ref(),
            RecordKind::Orders => self.orders.as_ref(),
            RecordKind::Payouts => self.payouts.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RutterConfig {
    pub base_url: String,
    pub api_version: String,
    pub auth: RutterAuth,
    pub access_tokens: AccessTokens,
    pub page_limit: u32,
    pub request_timeout: Duration,
    /// Upper bound for retrying transient page errors. `None` stops on the
    /// first error.
    pub retry_max_elapsed: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub window_size: u32,
    pub window_mode: WindowMode,
    pub report_dir: PathBuf,
}

impl SyncConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = common.is_production();

        let auth = match (env::var("RUTTER_CLIENT_ID"), env::var("RUTTER_CLIENT_SECRET")) {
            (Ok(client_id), Ok(client_secret)) => RutterAuth::Basic {
                client_id,
                client_secret: Secret::new(client_secret),
            },
            _ => RutterAuth::Header(Secret::new(get_env("RUTTER_AUTH", Some(""), is_prod)?)),
        };

        let shared_token = env::var("RUTTER_ACCESS_TOKEN").ok();
        let token = |key: &str| {
            env::var(key)
                .ok()
                .or_else(|| shared_token.clone())
                .map(Secret::new)
        };

        Ok(Self {
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "payments-sync".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("payments_sync"), is_prod)?,
            },
            rutter: RutterConfig {
                base_url: get_env("RUTTER_BASE_URL", Some(DEFAULT_RUTTER_BASE_URL), false)?,
                api_version: get_env("RUTTER_API_VERSION", Some("2023-03-14"), is_prod)?,
                auth,
                access_tokens: AccessTokens {
                    transactions: token("RUTTER_TRANSACTIONS_ACCESS_TOKEN"),
                    orders: token("RUTTER_ORDERS_ACCESS_TOKEN"),
                    payouts: token("RUTTER_PAYOUTS_ACCESS_TOKEN"),
                },
                page_limit: parse_env("RUTTER_PAGE_LIMIT", 500)?,
                request_timeout: Duration::from_secs(parse_env("RUTTER_REQUEST_TIMEOUT_SECS", 60)?),
                retry_max_elapsed: env::var("RUTTER_RETRY_MAX_ELAPSED_SECS")
                    .ok()
                    .map(|raw| parse_value::<u64>("RUTTER_RETRY_MAX_ELAPSED_SECS", &raw))
                    .transpose()?
                    .map(Duration::from_secs),
            },
            ingest: IngestConfig {
                batch_size: parse_env("INGEST_BATCH_SIZE", 500)?,
            },
            reconcile: ReconcileConfig {
                window_size: parse_env("RECONCILE_WINDOW_SIZE", 500)?,
                window_mode: parse_env("RECONCILE_WINDOW_MODE", WindowMode::Keyset)?,
                report_dir: PathBuf::from(get_env("REPORT_DIR", Some("reports"), false)?),
            },
            common,
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::Config(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::Config(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(anyhow::anyhow!("{} has an invalid value: {}", key, raw)))
}
