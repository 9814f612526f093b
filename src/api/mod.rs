pub mod error;
pub mod health;
pub mod manual_override;
pub mod prices;
pub mod recommendation;
pub mod schedule;
pub mod state;
pub mod v1;

use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{config::Config, controller::AppState};

pub fn router(state: AppState, cfg: &Config) -> Router {
    let health = Router::new()
        .route("/health", get(health::health_check))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", v1::router(state))
        .merge(health)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            cfg.server.request_timeout_secs,
        )))
}
