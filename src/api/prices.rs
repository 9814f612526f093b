use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::controller::{AppState, RefreshOutcome};
use crate::domain::PricePoint;

use super::error::ApiError;

/// POST /prices/refresh
///
/// Pulls the tariff window from the external API and updates the store.
/// Idempotent; a failed fetch serves the stored window with `stale = true`.
pub async fn refresh(State(app): State<AppState>) -> Result<Json<RefreshOutcome>, ApiError> {
    let outcome = app.refresh_prices().await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct CurrentPricesQuery {
    pub hours: Option<i64>,
}

/// GET /prices/current?hours=H
pub async fn current(
    State(app): State<AppState>,
    Query(query): Query<CurrentPricesQuery>,
) -> Result<Json<Vec<PricePoint>>, ApiError> {
    let hours = query.hours.unwrap_or(24);
    if !(1..=168).contains(&hours) {
        return Err(ApiError::BadRequest(
            "hours must be between 1 and 168".to_string(),
        ));
    }
    let points = app.current_prices(hours).await?;
    Ok(Json(points))
}
