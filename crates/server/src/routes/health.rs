//! Health check handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::db::bounded;
use crate::state::AppState;

/// Readiness report.
#[derive(Debug, Serialize)]
pub struct Readiness {
    pub store: &'static str,
    pub cache: &'static str,
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Pings the product store within the configured timeout and reports the
/// cache hydration state. Returns 503 if the store is not reachable.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let cache = state.cache().state().as_str();

    match bounded(state.config().store_timeout, state.products().ping()).await {
        Ok(()) => (StatusCode::OK, Json(Readiness { store: "ok", cache })),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Readiness {
                    store: "unavailable",
                    cache,
                }),
            )
        }
    }
}
