//! Rutter API client.
//!
//! One authenticated GET per page against `{base}/{kind}/`. The response
//! carries the records under the kind's name and an optional `next_cursor`.

use crate::config::{RutterAuth, RutterConfig};
use crate::error::SyncError;
use crate::models::{Record, RecordKind};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header::AUTHORIZATION, Client};
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const VERSION_HEADER: &str = "X-Rutter-Version";

/// One page of records in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    /// `None` iff the source has no further pages.
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn kind(&self) -> RecordKind;

    async fn fetch(&self, cursor: Option<&str>) -> Result<Page, SyncError>;
}

/// Extra filters forwarded on every page request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl PageQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(after) = self.created_after {
            params.push(("created_at_min", after.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(before) = self.created_before {
            params.push(("created_at_max", before.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        params
    }
}

/// Page fetcher for a single record kind.
#[derive(Clone)]
pub struct RutterClient {
    client: Client,
    config: RutterConfig,
    kind: RecordKind,
    access_token: Secret<String>,
    query: PageQuery,
}

impl RutterClient {
    pub fn new(
        config: RutterConfig,
        kind: RecordKind,
        access_token: Secret<String>,
        query: PageQuery,
    ) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            config,
            kind,
            access_token,
            query,
        })
    }

    fn url(&self) -> String {
        format!("{}/{}/", self.config.base_url.trim_end_matches('/'), self.kind)
    }

    async fn fetch_once(&self, cursor: Option<&str>) -> Result<Page, SyncError> {
        let mut params: Vec<(&str, String)> = vec![
            ("access_token", self.access_token.expose_secret().clone()),
            ("expand", "platform_data".to_string()),
            ("limit", self.config.page_limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        params.extend(self.query.params());

        let mut request = self
            .client
            .get(self.url())
            .query(&params)
            .header(VERSION_HEADER, &self.config.api_version);

        request = match &self.config.auth {
            RutterAuth::Header(value) if value.expose_secret().is_empty() => request,
            RutterAuth::Header(value) => request.header(AUTHORIZATION, value.expose_secret()),
            RutterAuth::Basic {
                client_id,
                client_secret,
            } => request.basic_auth(client_id, Some(client_secret.expose_secret())),
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(kind = %self.kind, status = %status, "Rutter page response");

        if !status.is_success() {
            tracing::error!(kind = %self.kind, status = %status, "Rutter page request failed");
            return Err(SyncError::from_status(status, &body));
        }

        parse_page(self.kind, &body)
    }
}

#[async_trait]
impl PageFetcher for RutterClient {
    fn kind(&self) -> RecordKind {
        self.kind
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<Page, SyncError> {
        let Some(max_elapsed) = self.config.retry_max_elapsed else {
            return self.fetch_once(cursor).await;
        };

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(max_elapsed),
            ..Default::default()
        };

        retry(policy, || async {
            self.fetch_once(cursor).await.map_err(|e| {
                if e.is_transient() {
                    tracing::warn!(kind = %self.kind, error = %e, "Retrying page fetch");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }
}

fn parse_page(kind: RecordKind, body: &str) -> Result<Page, SyncError> {
    let mut payload: Value = serde_json::from_str(body)
        .map_err(|e| SyncError::Decode(format!("invalid {} page: {}", kind, e)))?;

    let records = match payload.get_mut(kind.as_str()).map(Value::take) {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(Record::from_json)
            .collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(SyncError::Decode(format!(
                "page has no `{}` array",
                kind
            )))
        }
    };

    let next_cursor = payload
        .get("next_cursor")
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_owned);

    Ok(Page {
        records,
        next_cursor,
    })
}

/// Builds a fetcher per run. The HTTP surface and the CLI share one.
pub trait FetcherFactory: Send + Sync {
    fn fetcher(
        &self,
        kind: RecordKind,
        query: PageQuery,
    ) -> Result<Arc<dyn PageFetcher>, SyncError>;
}

#[derive(Clone)]
pub struct RutterClients {
    config: RutterConfig,
}

impl RutterClients {
    pub fn new(config: RutterConfig) -> Self {
        Self { config }
    }
}

impl FetcherFactory for RutterClients {
    fn fetcher(
        &self,
        kind: RecordKind,
        query: PageQuery,
    ) -> Result<Arc<dyn PageFetcher>, SyncError> {
        let token = self
            .config
            .access_tokens
            .for_kind(kind)
            .cloned()
            .ok_or_else(|| SyncError::Config(format!("no access token configured for {}", kind)))?;
        Ok(Arc::new(RutterClient::new(
            self.config.clone(),
            kind,
            token,
            query,
        )?))
    }
}

/// Replays scripted pages and records the cursor of every call.
pub struct MockPageFetcher {
    kind: RecordKind,
    responses: Mutex<VecDeque<Result<Page, SyncError>>>,
    cursors: Mutex<Vec<Option<String>>>,
}

impl MockPageFetcher {
    pub fn new(kind: RecordKind, responses: Vec<Result<Page, SyncError>>) -> Self {
        Self {
            kind,
            responses: Mutex::new(responses.into()),
            cursors: Mutex::new(Vec::new()),
        }
    }

    pub fn cursors_seen(&self) -> Vec<Option<String>> {
        self.cursors
            .lock()
            .map(|cursors| cursors.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.cursors_seen().len()
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    fn kind(&self) -> RecordKind {
        self.kind
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<Page, SyncError> {
        self.cursors
            .lock()
            .map_err(|e| SyncError::Store(format!("Mock fetcher mutex poisoned: {}", e)))?
            .push(cursor.map(str::to_owned));

        self.responses
            .lock()
            .map_err(|e| SyncError::Store(format!("Mock fetcher mutex poisoned: {}", e)))?
            .pop_front()
            .unwrap_or_else(|| {
                Err(SyncError::Transport {
                    message: "no scripted page left".to_string(),
                    transient: false,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessTokens;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> RutterConfig {
        RutterConfig {
            base_url: base_url.to_string(),
            api_version: "2023-03-14".to_string(),
            auth: RutterAuth::Header(Secret::new("Basic abc123".to_string())),
            access_tokens: AccessTokens {
                transactions: Some(Secret::new("tok_tx".to_string())),
                ..Default::default()
            },
            page_limit: 500,
            request_timeout: Duration::from_secs(5),
            retry_max_elapsed: None,
        }
    }

    fn client(config: RutterConfig) -> RutterClient {
        RutterClient::new(
            config,
            RecordKind::Transactions,
            Secret::new("tok_tx".to_string()),
            PageQuery::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sends_credentials_and_reads_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transactions/"))
            .and(query_param("access_token", "tok_tx"))
            .and(query_param("expand", "platform_data"))
            .and(query_param("limit", "500"))
            .and(query_param("cursor", "c1"))
            .and(header("Authorization", "Basic abc123"))
            .and(header("X-Rutter-Version", "2023-03-14"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transactions": [{ "id": "T1" }, { "id": "T2" }],
                "next_cursor": "c2"
            })))
            .mount(&server)
            .await;

        let page = client(config(&server.uri())).fetch(Some("c1")).await.unwrap();

        assert_eq!(
            page.records.iter().map(|r| r.id()).collect::<Vec<_>>(),
            vec!["T1", "T2"]
        );
        assert_eq!(page.next_cursor.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn forwards_creation_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("created_at_min", "2024-01-01T00:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transactions": [],
                "next_cursor": null
            })))
            .mount(&server)
            .await;

        let query = PageQuery {
            created_after: Some("2024-01-01T00:00:00Z".parse().unwrap()),
            created_before: None,
        };
        let client = RutterClient::new(
            config(&server.uri()),
            RecordKind::Transactions,
            Secret::new("tok_tx".to_string()),
            query,
        )
        .unwrap();

        let page = client.fetch(None).await.unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.next_cursor, None);
    }

    #[tokio::test]
    async fn server_errors_are_transient_transport_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = client(config(&server.uri())).fetch(None).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn rejected_credentials_are_auth_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let err = client(config(&server.uri())).fetch(None).await.unwrap_err();
        assert!(matches!(err, SyncError::Auth(_)));
    }

    #[tokio::test]
    async fn missing_record_array_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "orders": [] })))
            .mount(&server)
            .await;

        let err = client(config(&server.uri())).fetch(None).await.unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transactions": [{ "id": "T1" }]
            })))
            .mount(&server)
            .await;

        let mut config = config(&server.uri());
        config.retry_max_elapsed = Some(Duration::from_secs(10));

        let page = client(config).fetch(None).await.unwrap();
        assert_eq!(page.records.len(), 1);
    }

    #[test]
    fn empty_cursor_means_no_more_pages() {
        let page = parse_page(
            RecordKind::Orders,
            r#"{"orders": [{"id": "O1"}], "next_cursor": ""}"#,
        )
        .unwrap();
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn factory_requires_a_token_per_kind() {
        let clients = RutterClients::new(config("http://localhost"));
        assert!(clients
            .fetcher(RecordKind::Transactions, PageQuery::default())
            .is_ok());
        assert!(matches!(
            clients.fetcher(RecordKind::Payouts, PageQuery::default()),
            Err(SyncError::Config(_))
        ));
    }
}
