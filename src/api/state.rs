use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::bridge::Freshness;
use crate::controller::AppState;
use crate::domain::SystemState;

use super::error::ApiError;

#[derive(Debug, Serialize)]
pub struct SystemStateResponse {
    #[serde(flatten)]
    pub state: SystemState,
    pub current_price_pence: Option<f64>,
    pub snapshot_freshness: &'static str,
}

/// GET /state/current
pub async fn current(State(app): State<AppState>) -> Result<Json<SystemStateResponse>, ApiError> {
    let (snapshot, price) = app.current_state().await?;
    Ok(Json(SystemStateResponse {
        state: snapshot.state,
        current_price_pence: price.map(|p| p.unit_price_pence),
        snapshot_freshness: match snapshot.freshness {
            Freshness::Live => "live",
            Freshness::Cached => "cached",
            Freshness::Fallback => "fallback",
        },
    }))
}
