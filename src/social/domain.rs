// Social graph domain: pure types and set logic, no storage
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::db::models::{PostId, Profile, ProfileId};
use crate::error::{AppError, AppResult};

pub const MAX_NAME_LEN: usize = 50;
pub const MAX_CITY_LEN: usize = 100;
pub const MAX_MESSAGE_LEN: usize = 2000;

/// Result of asking for a new friendship. Only `Added` changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendOutcome {
    Added,
    AlreadyFriends,
    SelfFriendship,
}

impl FriendOutcome {
    pub fn is_added(self) -> bool {
        self == Self::Added
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProfile {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub image_url: String,
}

impl NewProfile {
    pub fn validate(&self) -> AppResult<()> {
        validate_name("first_name", &self.first_name)?;
        validate_name("last_name", &self.last_name)?;
        if self.city.chars().count() > MAX_CITY_LEN {
            return Err(AppError::BadRequest(format!(
                "city must be {} characters or less",
                MAX_CITY_LEN
            )));
        }
        Ok(())
    }
}

/// Partial profile edit. Names are fixed after creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub city: Option<String>,
    pub image_url: Option<String>,
}

impl ProfileUpdate {
    pub fn apply(&self, profile: &mut Profile) -> AppResult<()> {
        if let Some(city) = &self.city {
            if city.chars().count() > MAX_CITY_LEN {
                return Err(AppError::BadRequest(format!(
                    "city must be {} characters or less",
                    MAX_CITY_LEN
                )));
            }
            profile.city = city.trim().to_string();
        }
        if let Some(url) = &self.image_url {
            profile.image_url = url.trim().to_string();
        }
        Ok(())
    }
}

/// A post as it appears in someone's news feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedPost {
    pub id: PostId,
    pub profile_id: ProfileId,
    pub author: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

fn validate_name(field: &str, value: &str) -> AppResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{} cannot be empty", field)));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "{} must be {} characters or less",
            field, MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// Trim and bound a status message.
pub fn clean_message(message: &str) -> AppResult<String> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("Message cannot be empty".into()));
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(AppError::BadRequest(format!(
            "Message must be {} characters or less",
            MAX_MESSAGE_LEN
        )));
    }
    Ok(message.to_string())
}

/// Everyone except `me` and `me`'s friends, in input order.
pub fn recommend(all: Vec<Profile>, me: ProfileId, friends: &HashSet<ProfileId>) -> Vec<Profile> {
    all.into_iter()
        .filter(|p| p.id != me && !friends.contains(&p.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: i64) -> Profile {
        Profile {
            id: ProfileId(id),
            user_id: None,
            first_name: format!("First{}", id),
            last_name: format!("Last{}", id),
            city: String::new(),
            image_url: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn recommend_excludes_self_and_friends() {
        let all = (1..=5).map(profile).collect();
        let friends: HashSet<_> = [ProfileId(2), ProfileId(4)].into_iter().collect();

        let ids: Vec<i64> = recommend(all, ProfileId(1), &friends)
            .iter()
            .map(|p| p.id.get())
            .collect();
        assert_eq!(ids, vec![3, 5]);
    }

    #[test]
    fn recommend_without_friends_is_everyone_else() {
        let all = (1..=3).map(profile).collect();
        let ids: Vec<i64> = recommend(all, ProfileId(2), &HashSet::new())
            .iter()
            .map(|p| p.id.get())
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn clean_message_trims_and_bounds() {
        assert_eq!(clean_message("  hi  ").unwrap(), "hi");
        assert!(clean_message("   ").is_err());
        assert!(clean_message(&"x".repeat(MAX_MESSAGE_LEN + 1)).is_err());
        assert!(clean_message(&"x".repeat(MAX_MESSAGE_LEN)).is_ok());
    }

    #[test]
    fn new_profile_requires_names() {
        let mut new = NewProfile {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            city: "London".into(),
            image_url: String::new(),
        };
        assert!(new.validate().is_ok());

        new.last_name = " ".into();
        assert!(matches!(new.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn profile_update_touches_only_given_fields() {
        let mut p = profile(1);
        p.city = "Boston".into();
        ProfileUpdate {
            city: None,
            image_url: Some(" http://img ".into()),
        }
        .apply(&mut p)
        .unwrap();
        assert_eq!(p.city, "Boston");
        assert_eq!(p.image_url, "http://img");
    }

    #[test]
    fn friend_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&FriendOutcome::AlreadyFriends).unwrap();
        assert_eq!(json, "\"already_friends\"");
        assert!(FriendOutcome::Added.is_added());
        assert!(!FriendOutcome::SelfFriendship.is_added());
    }
}
