//! HTTP API module
//!
//! The control endpoints a presentation layer uses to drive study sessions.

pub mod handlers;
pub mod responses;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use handlers::*;

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/studies/:id/open", post(open_handler))
        .route("/studies/:id", get(session_handler))
        .route("/studies/:id/start", post(start_handler))
        .route("/studies/:id/stop", post(stop_handler))
        .route("/studies/:id/reset", post(reset_handler))
        .route("/studies/:id/scrap", post(scrap_handler))
        .route("/studies/:id/steps/:step_id/start", post(step_start_handler))
        .route("/studies/:id/steps/:step_id/stop", post(step_stop_handler))
        .route("/studies/:id/export.csv", get(export_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
