//! Application startup and lifecycle management.

use crate::config::ReconciliationConfig;
use crate::handlers;
use crate::services::{
    AccessGate, AlertEngine, AuditLog, AuditSink, BankingProvider, CapabilityGate,
    HttpBankingClient, HttpInvoiceClient, InvoiceSource, ReconciliationService, SyncScheduler,
    http_metrics_middleware, init_metrics,
};
use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReconciliationService>,
    pub gate: Arc<dyn AccessGate>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    sync_interval: Duration,
    shutdown: CancellationToken,
}

impl Application {
    /// Build the application with HTTP collaborators from configuration.
    pub async fn build(config: ReconciliationConfig) -> Result<Self, AppError> {
        let timeout = config.sync.fetch_timeout;

        let banking = HttpBankingClient::new(&config.banking.url, config.banking.token.clone(), timeout)
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to create banking client: {}", e))
            })?;
        let invoices = HttpInvoiceClient::new(&config.invoices.url, timeout).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to create invoice client: {}", e))
        })?;
        let gate = CapabilityGate::new(Some(config.auth.auth_service_endpoint.as_str()), timeout)?;

        Self::build_with(
            config,
            Arc::new(banking),
            Arc::new(invoices),
            Arc::new(AuditLog::new()),
            Arc::new(gate),
        )
        .await
    }

    /// Build the application around the given collaborators.
    pub async fn build_with(
        config: ReconciliationConfig,
        banking: Arc<dyn BankingProvider>,
        invoices: Arc<dyn InvoiceSource>,
        audit: Arc<dyn AuditSink>,
        gate: Arc<dyn AccessGate>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let service = Arc::new(ReconciliationService::new(
            banking,
            invoices,
            audit,
            config.engine(),
            AlertEngine::new(config.alert_thresholds()),
            config.service_settings(),
        ));

        let addr = config.common.socket_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Reconciliation service listener bound");

        Ok(Self {
            port,
            listener,
            state: AppState { service, gate },
            sync_interval: config.sync.interval,
            shutdown: CancellationToken::new(),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn service(&self) -> Arc<ReconciliationService> {
        self.state.service.clone()
    }

    /// Cancelling this token stops the scheduler and drains the HTTP server.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn router(state: AppState) -> Router {
        let api = Router::new()
            .route("/sync", post(handlers::trigger_sync))
            .route("/sync/status", get(handlers::sync_status))
            .route("/accounts", get(handlers::list_accounts))
            .route("/transactions", get(handlers::list_transactions))
            .route("/transactions/:id/verdict", put(handlers::set_verdict))
            .route(
                "/transactions/:id/suggestion/accept",
                post(handlers::accept_suggestion),
            )
            .route(
                "/transactions/:id/suggestion/reject",
                post(handlers::reject_suggestion),
            )
            .route("/transactions/:id/undo", post(handlers::undo_match))
            .route("/alerts", get(handlers::list_alerts))
            .route("/audit", get(handlers::list_audit))
            .route("/history", get(handlers::history))
            .route("/cash-flow", get(handlers::cash_flow))
            .route("/summary", get(handlers::summary));

        Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics_handler))
            .nest("/api/v1", api)
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(http_metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(state)
    }

    /// Run the scheduler and HTTP server until the shutdown token is cancelled.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let scheduler = SyncScheduler::spawn(
            self.state.service.clone(),
            self.sync_interval,
            self.shutdown.clone(),
        );

        let router = Self::router(self.state);

        tracing::info!(
            service = "reconciliation-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        let shutdown = self.shutdown.clone();
        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "HTTP server error");
                std::io::Error::other(format!("HTTP server error: {}", e))
            })?;

        if let Some(handle) = scheduler {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Sync scheduler task ended abnormally");
            }
        }

        Ok(())
    }
}
