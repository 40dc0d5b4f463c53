pub mod domain;
pub mod repository;

pub use domain::{
    present, CompanySummary, NewCompany, NewReview, Reaction, ReactionCounts, ReviewView,
};
pub use repository::{DynReviewRepository, ReviewRepository, SqliteReviewRepository};
