use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::db::models::{AccountId, Company, CompanyId, ReviewId};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::reviews::{
    present, CompanySummary, NewCompany, NewReview, Reaction, ReactionCounts, ReviewView,
};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Serialize)]
pub struct CompanyPage {
    pub company: Company,
    pub summary: CompanySummary,
    pub reviews: Vec<ReviewView>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/companies", get(list_companies).post(create_company))
        .route("/companies/search", get(search_companies))
        .route("/companies/{id}", get(company_page))
        .route("/companies/{id}/reviews", post(create_review))
        .route("/reviews/{id}", get(review_page).delete(delete_review))
        .route("/reviews/{id}/like", post(like_review))
        .route("/reviews/{id}/dislike", post(dislike_review))
        .route("/reviews/{id}/reaction", delete(clear_reaction))
}

/// Credits account of a signed-in viewer, if they have one.
async fn viewer_account(state: &AppState, user: Option<&CurrentUser>) -> AppResult<Option<AccountId>> {
    let Some(user) = user else {
        return Ok(None);
    };
    match state.credits.account_for_user(&user.id).await {
        Ok(account) => Ok(Some(account.id)),
        Err(AppError::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn list_companies(State(state): State<AppState>) -> AppResult<Json<Vec<Company>>> {
    Ok(Json(state.reviews.list_companies().await?))
}

async fn create_company(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(new): Json<NewCompany>,
) -> AppResult<Response> {
    let company = state.reviews.create_company(&new).await?;
    Ok((StatusCode::CREATED, Json(company)).into_response())
}

async fn search_companies(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<Vec<Company>>> {
    Ok(Json(state.reviews.search_companies(&params.q).await?))
}

/// Company with its rating summary; gated bodies are hidden per viewer
async fn company_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<CompanyId>,
) -> AppResult<Json<CompanyPage>> {
    let company = state.reviews.get_company(id).await?;
    let summary = state.reviews.company_summary(id).await?;
    let reviews = state.reviews.reviews_for_company(id).await?;

    let viewer = viewer_account(&state, user.as_ref()).await?;
    let grants = match viewer {
        Some(account) => state.reviews.granted_reviews(account, id).await?,
        None => HashSet::new(),
    };
    let reactions = state.reviews.reaction_counts(id).await?;

    Ok(Json(CompanyPage {
        company,
        summary,
        reviews: present(reviews, viewer, &grants, &reactions),
    }))
}

async fn review_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<ReviewId>,
) -> AppResult<Json<ReviewView>> {
    let review = state.reviews.get_review(id).await?;
    let company = review.company_id;

    let viewer = viewer_account(&state, user.as_ref()).await?;
    let grants = match viewer {
        Some(account) => state.reviews.granted_reviews(account, company).await?,
        None => HashSet::new(),
    };
    let reactions = state.reviews.reaction_counts(company).await?;

    present(vec![review], viewer, &grants, &reactions)
        .pop()
        .map(Json)
        .ok_or(AppError::NotFound)
}

/// Signed-in authors own their review and earn its unlock payments
async fn create_review(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<CompanyId>,
    Json(new): Json<NewReview>,
) -> AppResult<Response> {
    let author = viewer_account(&state, user.as_ref()).await?;
    let review = state
        .reviews
        .create_review(author, id, &new, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(review)).into_response())
}

async fn delete_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<ReviewId>,
) -> AppResult<StatusCode> {
    let account = state.credits.account_for_user(&user.id).await?;
    state.reviews.delete_review(account.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn react(
    state: &AppState,
    user: &CurrentUser,
    id: ReviewId,
    reaction: Reaction,
) -> AppResult<Json<ReactionCounts>> {
    let account = state.credits.account_for_user(&user.id).await?;
    let counts = state
        .reviews
        .react(account.id, id, reaction, Utc::now())
        .await?;
    Ok(Json(counts))
}

async fn like_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<ReviewId>,
) -> AppResult<Json<ReactionCounts>> {
    react(&state, &user, id, Reaction::Like).await
}

async fn dislike_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<ReviewId>,
) -> AppResult<Json<ReactionCounts>> {
    react(&state, &user, id, Reaction::Dislike).await
}

async fn clear_reaction(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<ReviewId>,
) -> AppResult<Json<ReactionCounts>> {
    let account = state.credits.account_for_user(&user.id).await?;
    Ok(Json(state.reviews.clear_reaction(account.id, id).await?))
}
