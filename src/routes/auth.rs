use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

use crate::auth::{clear_session_cookie, get_cookie_value, password, session, session_cookie, Credentials};
use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

/// POST /auth/signup: create a user; does not log in
async fn signup(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> AppResult<Response> {
    let user = password::signup(
        &state.db,
        &credentials,
        state.config.auth.password_cost,
        Utc::now(),
    )?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

/// POST /auth/login: verify credentials and set the session cookie
async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> AppResult<Response> {
    let user_id = password::verify(&state.db, &credentials)?;
    let auth = &state.config.auth;
    let token = session::create_session(&state.db, &user_id, auth.session_hours)?;

    tracing::info!(user_id = %user_id, "user logged in");
    Ok((
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            session_cookie(&auth.cookie_name, &token, auth.session_hours),
        )],
        Json(json!({ "ok": true, "user_id": user_id })),
    )
        .into_response())
}

/// POST /auth/logout: delete session and clear the cookie
async fn logout(State(state): State<AppState>, request: Request<Body>) -> AppResult<Response> {
    let (parts, _body) = request.into_parts();
    let cookie_name = &state.config.auth.cookie_name;

    if let Some(token) = get_cookie_value(&parts, cookie_name) {
        session::delete_session(&state.db, token)?;
    }

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie(cookie_name))],
        Json(json!({ "ok": true })),
    )
        .into_response())
}
