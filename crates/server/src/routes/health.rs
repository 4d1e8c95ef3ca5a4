use axum::Json;
use teambeat_api::HealthResponse;

/// GET /health — liveness check. Exempt from the session gate.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
