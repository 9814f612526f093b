use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::controller::AppState;
use crate::domain::{Device, PerDevice};
use crate::repo::ManualStatus;

use super::error::ApiError;

fn parse_device(raw: &str) -> Result<Device, ApiError> {
    raw.parse::<Device>().map_err(ApiError::BadRequest)
}

#[derive(Debug, Deserialize)]
pub struct SetRequest {
    pub device_id: String,
    pub desired_state: bool,
    pub source: Option<String>,
    pub duration_hours: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SetResponse {
    pub status: &'static str,
    pub override_id: i64,
    pub device_id: String,
    pub desired_state: bool,
    pub expires_at: DateTime<Utc>,
}

/// POST /manual-override/set
///
/// Creates a time-expiring override, atomically replacing any prior active
/// one for the device. Validation failures reject without touching state.
pub async fn set(
    State(app): State<AppState>,
    Json(request): Json<SetRequest>,
) -> Result<Json<SetResponse>, ApiError> {
    let device = parse_device(&request.device_id)?;
    let hours = request
        .duration_hours
        .unwrap_or(app.cfg.r#override.manual_default_hours);
    if !hours.is_finite() || hours <= 0.0 {
        return Err(ApiError::BadRequest(
            "duration_hours must be positive".to_string(),
        ));
    }
    if hours > app.cfg.r#override.manual_max_hours {
        return Err(ApiError::BadRequest(format!(
            "duration_hours must not exceed {}",
            app.cfg.r#override.manual_max_hours
        )));
    }

    let duration = Duration::milliseconds((hours * 3_600_000.0) as i64);
    let source = request.source.as_deref().unwrap_or("user");
    let now = app.clock.now();

    let row = app
        .repos
        .manual
        .set(device, request.desired_state, duration, source, now)
        .await?;

    Ok(Json(SetResponse {
        status: "ok",
        override_id: row.id,
        device_id: device.to_string(),
        desired_state: row.desired_state,
        expires_at: row.expires_at,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub overrides: PerDevice<ManualStatus>,
    pub any_active: bool,
}

/// GET /manual-override/status
pub async fn status(State(app): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let (_, overrides) = app.override_statuses().await?;
    let any_active = overrides.any(|o| o.is_active);
    Ok(Json(StatusResponse {
        overrides,
        any_active,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub device_id: String,
    pub cleared_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub status: &'static str,
    pub cleared_count: u64,
}

/// POST /manual-override/clear?device_id=&cleared_by=
///
/// Idempotent: clearing when nothing is active reports zero.
pub async fn clear(
    State(app): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> Result<Json<ClearResponse>, ApiError> {
    let device = parse_device(&query.device_id)?;
    let cleared_by = query.cleared_by.as_deref().unwrap_or("user");
    let now = app.clock.now();

    let cleared_count = app.repos.manual.clear(device, cleared_by, now).await?;
    Ok(Json(ClearResponse {
        status: "ok",
        cleared_count,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ClearAllQuery {
    pub cleared_by: Option<String>,
}

/// POST /manual-override/clear-all?cleared_by=
pub async fn clear_all(
    State(app): State<AppState>,
    Query(query): Query<ClearAllQuery>,
) -> Result<Json<ClearResponse>, ApiError> {
    let cleared_by = query.cleared_by.as_deref().unwrap_or("user");
    let now = app.clock.now();

    let cleared_count = app.repos.manual.clear_all(cleared_by, now).await?;
    Ok(Json(ClearResponse {
        status: "ok",
        cleared_count,
    }))
}
