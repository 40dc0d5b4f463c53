use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::db::models::{Voter, VoterId};
use crate::error::AppResult;
use crate::state::AppState;
use crate::voters::{FilterOptions, VoterFilter, VoterPage, VoterParams, VoterStats};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/voters", get(list_voters))
        .route("/voters/stats", get(voter_stats))
        .route("/voters/options", get(filter_options))
        .route("/voters/{id}", get(get_voter))
}

async fn list_voters(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> AppResult<Json<VoterPage>> {
    let params = VoterParams::from_pairs(pairs)?;
    let filter = VoterFilter::try_from(&params)?;
    let page = params.page.unwrap_or(1);
    Ok(Json(state.voters.list(&filter, page).await?))
}

async fn voter_stats(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> AppResult<Json<VoterStats>> {
    let params = VoterParams::from_pairs(pairs)?;
    let filter = VoterFilter::try_from(&params)?;
    Ok(Json(state.voters.stats(&filter).await?))
}

async fn filter_options(State(state): State<AppState>) -> AppResult<Json<FilterOptions>> {
    Ok(Json(state.voters.filter_options().await?))
}

async fn get_voter(
    State(state): State<AppState>,
    Path(id): Path<VoterId>,
) -> AppResult<Json<Voter>> {
    Ok(Json(state.voters.get(id).await?))
}
