//! Application startup and lifecycle management for `serve`.

use crate::handlers::{
    health_check, metrics_endpoint, readiness_check, trigger_import, trigger_reconciliation,
    trigger_summary,
};
use crate::jobs::JobSettings;
use crate::services::{FetcherFactory, RecordStore};
use axum::{
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub fetchers: Arc<dyn FetcherFactory>,
    pub settings: JobSettings,
    /// Held for the duration of any import, reconciliation or summary run.
    pub job_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        fetchers: Arc<dyn FetcherFactory>,
        settings: JobSettings,
    ) -> Self {
        Self {
            store,
            fetchers,
            settings,
            job_lock: Arc::new(Mutex::new(())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .route("/imports/:kind", post(trigger_import))
        .route("/reconciliations/:rule", post(trigger_reconciliation))
        .route("/summaries", post(trigger_summary))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Binds the listener. Port 0 picks a random port.
    pub async fn build(port: u16, state: AppState) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();
        tracing::info!("payments-sync listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serves until `shutdown` resolves.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| {
                tracing::error!("HTTP server error: {}", e);
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
