//! Prometheus exposition endpoint.
//!
//! Serves the registry in Prometheus text format at `/metrics`. Because
//! gathering drives a full collection pass with blocking file reads and
//! external command calls, encoding runs on the blocking thread pool. The
//! serving layer applies no collection timeout of its own; a scrape that
//! overruns is the scraper's timeout to enforce.

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::metrics::{error::MetricsError, opts::MetricsOptions, registry};

/// Handler for the `/metrics` endpoint.
async fn metrics_handler() -> impl IntoResponse {
    match tokio::task::spawn_blocking(|| {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry::REGISTRY.gather();
        encoder.encode_to_string(&metric_families)
    })
    .await
    {
        Ok(Ok(body)) => (StatusCode::OK, body),
        Ok(Err(error)) => {
            tracing::error!(
                event.name = "metrics.encode_failed",
                error.message = %error,
                "failed to encode metrics"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {error}"),
            )
        }
        Err(error) => {
            tracing::error!(
                event.name = "metrics.gather_failed",
                error.message = %error,
                "metrics gathering task panicked"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to gather metrics".to_owned(),
            )
        }
    }
}

/// Create the metrics HTTP router.
pub fn create_metrics_router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves metrics at `<listen_address>:<port>/metrics` in Prometheus text
/// format.
///
/// # Errors
///
/// Returns [`MetricsError`] if the listen address cannot be bound or the
/// server fails while serving.
pub async fn start_metrics_server(config: MetricsOptions) -> Result<(), MetricsError> {
    if !config.enabled {
        info!(
            event.name = "metrics.disabled",
            "metrics server is disabled in configuration"
        );
        return Ok(());
    }

    let app = create_metrics_router();

    let bind_address = format!("{}:{}", config.listen_address, config.port);
    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|e| MetricsError::bind_address(&bind_address, e))?;

    info!(
        event.name = "metrics.started",
        net.listen.address = %bind_address,
        "metrics server started"
    );

    axum::serve(listener, app)
        .await
        .map_err(MetricsError::ServeError)?;

    Ok(())
}
