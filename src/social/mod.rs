pub mod domain;
pub mod repository;

pub use domain::{FeedPost, FriendOutcome, NewProfile, ProfileUpdate};
pub use repository::{DynSocialRepository, SocialRepository, SqliteSocialRepository};
