pub mod health;
pub mod slots;
pub mod workflow;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/start", post(workflow::start))
        .route("/confirm", post(workflow::confirm))
        .route("/pending/:user_id", get(workflow::pending))
        .route("/slots", get(slots::list_slots))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
