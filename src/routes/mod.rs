pub mod auth;
pub mod credits;
pub mod reviews;
pub mod social;
pub mod voters;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

/// Every JSON endpoint, without state or middleware attached.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(social::router())
        .merge(credits::router())
        .merge(reviews::router())
        .merge(voters::router())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
