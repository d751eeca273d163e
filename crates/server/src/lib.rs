//! Sluice Server: the HTTP layer in front of the query gateway.
//!
//! Exposes the gateway via:
//! - **REST**: query submission and continuation endpoints (`api`).
//! - **Observability**: Prometheus metrics at `/metrics`, structured logs on
//!   the `queries` and `errors` targets, optional OpenTelemetry tracing.
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;

use sluice_common::config::AppConfig;
use sluice_common::telemetry::{init_tracing, shutdown_telemetry, ERRORS_TARGET};
use sluice_common::SourcesConfig;
use sluice_connectors::{ConnectorProvider, DelegateEngine};
use sluice_error::SluiceError;
use sluice_runtime::{GatewayOptions, QueryGateway};
use tracing::info;

pub mod api;
pub mod error;
pub mod metrics;

pub use api::router;
pub use error::ApiError;
pub use metrics::GatewayMetrics;

/// Shared handler state: the one gateway and the metrics registry.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<QueryGateway>,
    pub metrics: GatewayMetrics,
}

impl AppState {
    pub fn new(gateway: Arc<QueryGateway>) -> anyhow::Result<Self> {
        Ok(Self {
            gateway,
            metrics: GatewayMetrics::new()?,
        })
    }

    /// Counts and logs a failed request on its way to the client.
    pub(crate) fn fail(&self, err: SluiceError) -> ApiError {
        self.metrics.record_error(&err);
        if err.is_client_facing() {
            tracing::debug!(code = %err.code, "Request rejected: {}", err.message);
        } else {
            tracing::error!(
                target: ERRORS_TARGET,
                code = %err.code,
                trace_id = err.trace_id.as_deref().unwrap_or("-"),
                "Request failed: {}",
                err.message
            );
        }
        ApiError(err)
    }
}

pub struct SluiceServer {
    app_config_path: String,
    sources_path: String,
    extra_providers: Vec<Box<dyn ConnectorProvider>>,
    delegate: Option<Arc<dyn DelegateEngine>>,
}

impl Default for SluiceServer {
    fn default() -> Self {
        Self {
            app_config_path: "config/sluice.yaml".to_string(),
            sources_path: "config/sources.yaml".to_string(),
            extra_providers: vec![],
            delegate: None,
        }
    }
}

impl SluiceServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app_config(mut self, app_config_path: &str) -> Self {
        self.app_config_path = app_config_path.to_string();
        self
    }

    pub fn with_sources(mut self, sources_path: &str) -> Self {
        self.sources_path = sources_path.to_string();
        self
    }

    pub fn with_connector_provider(mut self, provider: Box<dyn ConnectorProvider>) -> Self {
        self.extra_providers.push(provider);
        self
    }

    /// Overrides the delegate engine built from the `delegate` config section.
    pub fn with_delegate(mut self, delegate: Arc<dyn DelegateEngine>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let app_config = AppConfig::from_file(&self.app_config_path)?;
        let sources = SourcesConfig::from_file(&self.sources_path)?;

        init_tracing(&app_config.logging, &app_config.telemetry)?;

        let mut options = GatewayOptions::from_config(&app_config, sources)?;
        for provider in self.extra_providers {
            options = options.with_connector_provider(provider);
        }
        if let Some(delegate) = self.delegate {
            options = options.with_delegate(delegate);
        }
        let delegate_configured = options.delegate.is_some();

        let gateway = Arc::new(QueryGateway::new(options));
        let sweeper = gateway.spawn_sweeper();
        let app = router(AppState::new(gateway.clone())?);

        let addr: SocketAddr = app_config
            .server
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address {}", app_config.server.listen_addr))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        info!(
            "{} listening on {} (capacity={}, delegate={}, coordinator={})",
            app_config.server.name,
            addr,
            gateway.capacity(),
            delegate_configured,
            gateway.coordinator_id()
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        sweeper.stop();
        info!(live_queries = gateway.live_queries(), "Server stopped");
        shutdown_telemetry();
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
