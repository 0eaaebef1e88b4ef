//! Liveness and health endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::ledger::Ledger;
use crate::state::AppState;

pub async fn root() -> &'static str {
    "Lending API Server"
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health_check<L: Ledger>(
    State(state): State<AppState<L>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, database) = match state.ledger.ping().await {
        Ok(()) => (StatusCode::OK, "healthy", "connected".to_string()),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "unhealthy",
            format!("error: {}", e),
        ),
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            database,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
