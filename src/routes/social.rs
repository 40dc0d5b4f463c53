use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::models::{Post, PostId, Profile, ProfileId};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::social::{FeedPost, NewProfile, ProfileUpdate};
use crate::state::AppState;

// --- Request/response types ---

#[derive(Deserialize)]
pub struct PostForm {
    pub message: String,
}

/// A profile page: the person, their friends and their own posts.
#[derive(Serialize)]
pub struct ProfilePage {
    pub profile: Profile,
    pub friends: Vec<Profile>,
    pub posts: Vec<Post>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profiles", get(list_profiles).post(create_profile))
        .route("/profiles/me", get(my_profile).put(update_my_profile))
        .route("/profiles/{id}", get(profile_page))
        .route(
            "/profiles/me/friends/{other}",
            get(is_friends_with).post(add_friend).delete(remove_friend),
        )
        .route("/profiles/me/recommendations", get(recommendations))
        .route("/profiles/me/feed", get(news_feed))
        .route("/posts", post(create_post))
        .route("/posts/{id}", put(update_post).delete(delete_post))
}

/// The caller's own profile id; 404 until they create one.
async fn my_profile_id(state: &AppState, user: &CurrentUser) -> AppResult<ProfileId> {
    Ok(state.social.profile_for_user(&user.id).await?.id)
}

// --- Handlers ---

async fn list_profiles(State(state): State<AppState>) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(state.social.list_profiles().await?))
}

async fn create_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(new): Json<NewProfile>,
) -> AppResult<Response> {
    let profile = state
        .social
        .create_profile(&new, Some(&user.id), Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(profile)).into_response())
}

async fn my_profile(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Profile>> {
    Ok(Json(state.social.profile_for_user(&user.id).await?))
}

async fn update_my_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<Profile>> {
    let me = my_profile_id(&state, &user).await?;
    Ok(Json(state.social.update_profile(me, &update).await?))
}

async fn profile_page(
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
) -> AppResult<Json<ProfilePage>> {
    let profile = state.social.get_profile(id).await?;
    let friends = state.social.friends_of(id).await?;
    let posts = state.social.posts_of(id).await?;
    Ok(Json(ProfilePage {
        profile,
        friends,
        posts,
    }))
}

async fn add_friend(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(other): Path<ProfileId>,
) -> AppResult<Response> {
    let me = my_profile_id(&state, &user).await?;
    let outcome = state.social.add_friend(me, other, Utc::now()).await?;
    let status = if outcome.is_added() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({ "outcome": outcome }))).into_response())
}

async fn is_friends_with(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(other): Path<ProfileId>,
) -> AppResult<Json<serde_json::Value>> {
    let me = my_profile_id(&state, &user).await?;
    let friends = state.social.is_friends_with(me, other).await?;
    Ok(Json(json!({ "friends": friends })))
}

async fn remove_friend(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(other): Path<ProfileId>,
) -> AppResult<StatusCode> {
    let me = my_profile_id(&state, &user).await?;
    if state.social.remove_friend(me, other).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

async fn recommendations(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Profile>>> {
    let me = my_profile_id(&state, &user).await?;
    Ok(Json(state.social.recommended_friends(me).await?))
}

async fn news_feed(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<FeedPost>>> {
    let me = my_profile_id(&state, &user).await?;
    Ok(Json(state.social.news_feed(me).await?))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(form): Json<PostForm>,
) -> AppResult<Response> {
    let me = my_profile_id(&state, &user).await?;
    let post = state
        .social
        .create_post(me, &form.message, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(post)).into_response())
}

async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<PostId>,
    Json(form): Json<PostForm>,
) -> AppResult<Json<Post>> {
    let me = my_profile_id(&state, &user).await?;
    Ok(Json(state.social.update_post(me, id, &form.message).await?))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<PostId>,
) -> AppResult<StatusCode> {
    let me = my_profile_id(&state, &user).await?;
    state.social.delete_post(me, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
