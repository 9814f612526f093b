use axum::{
    routing::{get, post},
    Router,
};

use crate::controller::AppState;

use super::{manual_override, prices, recommendation, schedule, state};

pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/prices/refresh", post(prices::refresh))
        .route("/prices/current", get(prices::current))
        .route("/recommendation/now", get(recommendation::now))
        .route("/history/recommendations", get(recommendation::history))
        .route("/state/current", get(state::current))
        .route("/schedule/update", post(schedule::update))
        .route("/schedule/status", get(schedule::status))
        .route("/schedule/history", get(schedule::history))
        .route("/manual-override/set", post(manual_override::set))
        .route("/manual-override/status", get(manual_override::status))
        .route("/manual-override/clear", post(manual_override::clear))
        .route("/manual-override/clear-all", post(manual_override::clear_all))
        .with_state(app)
}
