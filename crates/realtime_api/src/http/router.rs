use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::domain::TrafficSituationService;

/// State shared across handlers
pub struct AppState {
    pub service: Arc<TrafficSituationService>,
}

impl AppState {
    pub fn new(service: Arc<TrafficSituationService>) -> Self {
        Self { service }
    }
}

/// Create the real-time API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route(
            "/api/v1/realtime/route-info",
            post(handlers::push_route_info).get(handlers::get_route_info),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
