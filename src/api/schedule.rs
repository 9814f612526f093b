use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::controller::AppState;
use crate::domain::{Device, PerDevice};
use crate::repo::{ScheduleEventRow, ScheduleStatus};

use super::error::ApiError;

fn parse_device(raw: &str) -> Result<Device, ApiError> {
    raw.parse::<Device>().map_err(ApiError::BadRequest)
}

#[derive(Debug, Deserialize)]
pub struct ScheduleUpdateRequest {
    pub device_id: String,
    pub is_active: bool,
    pub reason: Option<String>,
    /// When the external schedule source observed the transition. Defaults
    /// to now.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleUpdateResponse {
    pub status: &'static str,
    pub message: String,
}

/// POST /schedule/update
///
/// Heartbeat-bearing report from the external schedule source.
pub async fn update(
    State(app): State<AppState>,
    Json(request): Json<ScheduleUpdateRequest>,
) -> Result<Json<ScheduleUpdateResponse>, ApiError> {
    let device = parse_device(&request.device_id)?;
    let now = app.clock.now();
    let reported_at = request.timestamp.unwrap_or(now);

    app.repos
        .schedule
        .report(device, request.is_active, request.reason.as_deref(), reported_at, now)
        .await?;

    let state = if request.is_active { "active" } else { "inactive" };
    Ok(Json(ScheduleUpdateResponse {
        status: "ok",
        message: format!("schedule override for '{device}' set to {state}"),
    }))
}

#[derive(Debug, Serialize)]
pub struct ScheduleStatusResponse {
    pub schedules: PerDevice<ScheduleStatus>,
    pub any_active: bool,
}

/// GET /schedule/status
pub async fn status(
    State(app): State<AppState>,
) -> Result<Json<ScheduleStatusResponse>, ApiError> {
    let (schedules, _) = app.override_statuses().await?;
    let any_active = schedules.any(|s| s.is_active);
    Ok(Json(ScheduleStatusResponse {
        schedules,
        any_active,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleHistoryQuery {
    pub device_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleHistoryResponse {
    pub history: Vec<ScheduleEventRow>,
    pub total_records: usize,
}

/// GET /schedule/history?device_id=&start=&end=&limit=
pub async fn history(
    State(app): State<AppState>,
    Query(query): Query<ScheduleHistoryQuery>,
) -> Result<Json<ScheduleHistoryResponse>, ApiError> {
    let device = match &query.device_id {
        Some(raw) => Some(parse_device(raw)?),
        None => None,
    };
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);

    let history = app
        .repos
        .schedule
        .history(device, query.start, query.end, limit)
        .await?;

    Ok(Json(ScheduleHistoryResponse {
        total_records: history.len(),
        history,
    }))
}
