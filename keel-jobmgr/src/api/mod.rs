//! API Module
//!
//! HTTP surface of the job manager. Only health is served here; the job and
//! task APIs live in front of this process.

pub mod health;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::goalstate::Driver;

/// Create the API router
pub fn create_router(driver: Arc<Driver>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .with_state(driver)
        .layer(TraceLayer::new_for_http())
}
