use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::credits::UnlockState;
use crate::db::models::{AccountId, CompanyId, Review, ReviewId};
use crate::error::{AppError, AppResult};

pub const JOB_TYPES: &[&str] = &["Full-time", "Part-time", "Internship", "Contract", "Other"];

#[derive(Debug, Clone, Deserialize)]
pub struct NewCompany {
    pub name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub location: String,
}

impl NewCompany {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Company name cannot be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub role_title: String,
    pub job_type: String,
    #[serde(default)]
    pub body: String,
    pub rating: i64,
    pub difficulty: i64,
    #[serde(default)]
    pub gated: bool,
    #[serde(default)]
    pub unlock_cost: i64,
}

impl NewReview {
    pub fn validate(&self) -> AppResult<()> {
        if self.role_title.trim().is_empty() {
            return Err(AppError::BadRequest("Role cannot be empty".into()));
        }
        if !JOB_TYPES.contains(&self.job_type.as_str()) {
            return Err(AppError::BadRequest(format!(
                "Job type must be one of: {}",
                JOB_TYPES.join(", ")
            )));
        }
        for (field, value) in [("rating", self.rating), ("difficulty", self.difficulty)] {
            if !(1..=5).contains(&value) {
                return Err(AppError::BadRequest(format!(
                    "{} must be between 1 and 5",
                    field
                )));
            }
        }
        if self.unlock_cost < 0 {
            return Err(AppError::BadRequest("Unlock cost cannot be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanySummary {
    pub review_count: i64,
    pub average_rating: Option<f64>,
    pub average_difficulty: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    pub fn as_str(self) -> &'static str {
        match self {
            Reaction::Like => "like",
            Reaction::Dislike => "dislike",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReactionCounts {
    pub likes: i64,
    pub dislikes: i64,
}

/// A review as shown to one viewer; gated bodies stay hidden until unlocked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewView {
    pub id: ReviewId,
    pub company_id: CompanyId,
    pub author: Option<AccountId>,
    pub role_title: String,
    pub job_type: String,
    pub rating: i64,
    pub difficulty: i64,
    pub gated: bool,
    pub unlock_cost: i64,
    pub unlocked: bool,
    pub body: Option<String>,
    pub reactions: ReactionCounts,
    pub created_at: DateTime<Utc>,
}

impl ReviewView {
    pub fn new(review: Review, unlocked: bool) -> Self {
        Self {
            id: review.id,
            company_id: review.company_id,
            author: review.account_id,
            role_title: review.role_title,
            job_type: review.job_type,
            rating: review.rating,
            difficulty: review.difficulty,
            gated: review.gated,
            unlock_cost: review.unlock_cost,
            unlocked,
            body: unlocked.then_some(review.body),
            reactions: ReactionCounts::default(),
            created_at: review.created_at,
        }
    }
}

/// Resolve each review's lock for `viewer`; anonymous viewers only see open reviews.
pub fn present(
    reviews: Vec<Review>,
    viewer: Option<AccountId>,
    grants: &HashSet<ReviewId>,
    reactions: &HashMap<ReviewId, ReactionCounts>,
) -> Vec<ReviewView> {
    reviews
        .into_iter()
        .map(|review| {
            let unlocked = match viewer {
                Some(viewer) => UnlockState::resolve(
                    review.gated,
                    review.account_id,
                    viewer,
                    grants.contains(&review.id),
                )
                .is_unlocked(),
                None => !review.gated,
            };
            let counts = reactions.get(&review.id).copied().unwrap_or_default();
            ReviewView {
                reactions: counts,
                ..ReviewView::new(review, unlocked)
            }
        })
        .collect()
}
