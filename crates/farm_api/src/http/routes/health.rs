use crate::http::HealthResponse;
use axum::Json;

/// Liveness probe, no authentication
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
