//! Liveness and readiness endpoints for orchestrators and probes.

mod error;

use std::{
    net::Ipv4Addr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
pub use error::HealthError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Configuration for the API server (health endpoints).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ApiOptions {
    /// Enable the API server.
    pub enabled: bool,
    /// The network address the API server will listen on.
    pub listen_address: String,
    /// The port the API server will listen on.
    pub port: u16,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_address: Ipv4Addr::UNSPECIFIED.to_string(),
            port: 8080,
        }
    }
}

#[derive(Clone)]
pub struct HealthState {
    /// At least one connection-table source was readable at startup.
    pub tables_readable: Arc<AtomicBool>,
    pub startup_complete: Arc<AtomicBool>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            tables_readable: Arc::new(AtomicBool::new(false)),
            startup_complete: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub async fn liveness_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let tables_readable = state.tables_readable.load(Ordering::Relaxed);
    let startup_complete = state.startup_complete.load(Ordering::Relaxed);

    // Alive while still starting up; afterwards, dead only if no table
    // source could be read at all.
    let is_alive = tables_readable || !startup_complete;

    let status_code = if is_alive {
        StatusCode::OK
    } else {
        warn!(
            event.name = "health.liveness.failed",
            tables_readable = %tables_readable,
            startup_complete = %startup_complete,
            "liveness check failed"
        );
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = Json(json!({
        "status": if is_alive { "ok" } else { "unavailable" },
        "checks": {
            "tables_readable": tables_readable,
            "startup_complete": startup_complete
        }
    }));

    (status_code, body)
}

pub async fn readiness_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let tables_readable = state.tables_readable.load(Ordering::Relaxed);
    let startup_complete = state.startup_complete.load(Ordering::Relaxed);

    let is_ready = tables_readable && startup_complete;

    let status_code = if is_ready {
        StatusCode::OK
    } else {
        warn!(
            event.name = "health.readiness.failed",
            tables_readable = %tables_readable,
            startup_complete = %startup_complete,
            "readiness check failed"
        );
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = Json(json!({
        "status": if is_ready { "ok" } else { "unavailable" },
        "checks": {
            "tables_readable": tables_readable,
            "startup_complete": startup_complete
        }
    }));

    (status_code, body)
}

pub fn create_health_router(state: HealthState) -> Router {
    Router::new()
        .route("/livez", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the health/API server.
///
/// # Errors
///
/// Returns [`HealthError`] if the listen address cannot be bound or the
/// server fails while serving.
pub async fn start_api_server(state: HealthState, config: ApiOptions) -> Result<(), HealthError> {
    let app = create_health_router(state);

    let bind_address = format!("{}:{}", config.listen_address, config.port);
    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|e| HealthError::bind_address(&bind_address, e))?;

    info!(
        event.name = "api.started",
        net.listen.address = %bind_address,
        "api server has started"
    );
    axum::serve(listener, app)
        .await
        .map_err(HealthError::ServeError)?;
    Ok(())
}
