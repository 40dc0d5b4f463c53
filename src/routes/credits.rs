use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::credits::{CheckInOutcome, NewAccount, UnlockOutcome};
use crate::db::models::{Account, CheckIn, ReviewId};
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(create_account))
        .route("/accounts/me", get(my_account))
        .route("/accounts/me/check-in", post(check_in))
        .route("/accounts/me/check-ins", get(my_check_ins))
        .route("/reviews/{id}/unlock", post(unlock_review))
}

async fn create_account(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(new): Json<NewAccount>,
) -> AppResult<Response> {
    let account = state
        .credits
        .create_account(&new, Some(&user.id), Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(account)).into_response())
}

async fn my_account(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Account>> {
    Ok(Json(state.credits.account_for_user(&user.id).await?))
}

/// Daily bonus, keyed on the server's UTC calendar day
async fn check_in(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<CheckInOutcome>> {
    let account = state.credits.account_for_user(&user.id).await?;
    let today = Utc::now().date_naive();
    Ok(Json(state.credits.check_in(account.id, today).await?))
}

async fn my_check_ins(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<CheckIn>>> {
    let account = state.credits.account_for_user(&user.id).await?;
    Ok(Json(state.credits.check_ins_of(account.id).await?))
}

async fn unlock_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<ReviewId>,
) -> AppResult<Json<UnlockOutcome>> {
    let account = state.credits.account_for_user(&user.id).await?;
    Ok(Json(state.credits.unlock(account.id, id, Utc::now()).await?))
}
