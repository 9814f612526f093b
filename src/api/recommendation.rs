use axum::extract::{Query, State};
use axum::Json;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::controller::AppState;
use crate::domain::Recommendation;

use super::error::ApiError;

/// GET /recommendation/now
///
/// The main decision endpoint: runs one full cycle (snapshot, optimise,
/// resolve overrides) and returns the persisted recommendation record.
/// Degraded inputs yield a fallback recommendation, never an error.
pub async fn now(State(app): State<AppState>) -> Result<Json<Recommendation>, ApiError> {
    let recommendation = app.recommendation_now().await?;
    Ok(Json(recommendation))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub hours: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<Recommendation>,
    pub total_records: usize,
}

/// GET /history/recommendations?hours=&limit=
pub async fn history(
    State(app): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let hours = query.hours.unwrap_or(24).clamp(1, 168);
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let since = app.clock.now() - Duration::hours(hours);

    let rows = app.repos.recommendations.recent(since, limit).await?;
    let history: Vec<Recommendation> = rows
        .into_iter()
        .map(|row| row.into_recommendation())
        .collect();

    Ok(Json(HistoryResponse {
        total_records: history.len(),
        history,
    }))
}
