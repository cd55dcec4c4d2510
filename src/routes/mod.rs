pub mod analysis;
pub mod health;

use axum::Router;
use axum::routing::get;

use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/analysis", get(analysis::start_analysis))
        .route("/api/health", get(health::health))
        .with_state(state)
}
