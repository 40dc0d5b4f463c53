// Library exports for circles
// This allows integration tests and external code to use circles modules

pub mod auth;
pub mod config;
pub mod credits;
pub mod db;
pub mod error;
pub mod extractors;
pub mod reviews;
pub mod routes;
pub mod social;
pub mod state;
pub mod voters;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full application with tracing middleware and state attached.
pub fn app(state: AppState) -> Router {
    routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
