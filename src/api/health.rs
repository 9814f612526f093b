use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::controller::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    database: &'static str,
}

/// GET /health - liveness probe plus a database connectivity check
pub async fn health_check(State(app): State<AppState>) -> impl IntoResponse {
    let database_ok = sqlx::query("SELECT 1")
        .execute(&app.repos.pool)
        .await
        .is_ok();

    let response = HealthResponse {
        status: if database_ok { "healthy" } else { "degraded" },
        timestamp: app.clock.now(),
        database: if database_ok { "healthy" } else { "unhealthy" },
    };

    let code = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response))
}
