//! Registration server.
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Installs the Prometheus recorder and serves `/metrics`
//! - Connects the configured storage backend, running migrations for `PostgreSQL`
//! - Serves the registration API until Ctrl+C or SIGTERM
//!
//! # Usage
//!
//! ```bash
//! STORAGE_BACKEND=postgres DATABASE_URL=postgres://... cargo run --bin registration-server
//! ```

use anyhow::Context;
use axum::{http::StatusCode, routing::get, Router};
use registration::{Config, RegistrationApp};
use rollcall_runtime::metrics::MetricsServer;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        backend = ?config.storage.backend,
        policy = ?config.registration.capacity_policy,
        addr = %config.server.bind_addr(),
        "Starting registration server"
    );

    if let Some(addr) = config.server.metrics_addr() {
        let mut metrics = MetricsServer::new(addr);
        metrics.start().context("installing metrics recorder")?;
        spawn_metrics_endpoint(Arc::new(metrics)).await?;
    } else {
        tracing::warn!(host = %config.server.metrics_host, "Invalid metrics address; metrics disabled");
    }

    let app = RegistrationApp::from_config(config)
        .await
        .context("initializing application")?;
    app.run().await.context("serving")?;

    tracing::info!("Registration server stopped");
    Ok(())
}

async fn spawn_metrics_endpoint(metrics: Arc<MetricsServer>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(metrics.addr())
        .await
        .with_context(|| format!("binding metrics listener on {}", metrics.addr()))?;

    let router = Router::new().route(
        "/metrics",
        get(move || {
            let metrics = Arc::clone(&metrics);
            async move {
                metrics.render().map_or(
                    (StatusCode::SERVICE_UNAVAILABLE, String::new()),
                    |body| (StatusCode::OK, body),
                )
            }
        }),
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router).await {
            tracing::error!(error = %error, "Metrics endpoint stopped");
        }
    });
    Ok(())
}
