// Repository pattern - isolates all database side effects of the social graph
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::sync::Arc;

use crate::db::models::{Post, PostId, Profile, ProfileId};
use crate::db::{self, format_timestamp, parse_timestamp};
use crate::error::{AppError, AppResult, OptionalRow};
use crate::social::domain::{
    clean_message, recommend, FeedPost, FriendOutcome, NewProfile, ProfileUpdate,
};
use crate::state::DbPool;

#[async_trait]
pub trait SocialRepository: Send + Sync {
    async fn create_profile(
        &self,
        new: &NewProfile,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Profile>;

    async fn get_profile(&self, id: ProfileId) -> AppResult<Profile>;

    /// Profile linked to an authenticated user
    async fn profile_for_user(&self, user_id: &str) -> AppResult<Profile>;

    async fn list_profiles(&self) -> AppResult<Vec<Profile>>;

    async fn update_profile(&self, id: ProfileId, update: &ProfileUpdate) -> AppResult<Profile>;

    /// Insert the undirected edge `(me, other)` unless it exists in either orientation
    async fn add_friend(
        &self,
        me: ProfileId,
        other: ProfileId,
        now: DateTime<Utc>,
    ) -> AppResult<FriendOutcome>;

    /// Delete the edge in whichever orientation it was stored; false if there was none
    async fn remove_friend(&self, me: ProfileId, other: ProfileId) -> AppResult<bool>;

    async fn is_friends_with(&self, me: ProfileId, other: ProfileId) -> AppResult<bool>;

    async fn friends_of(&self, profile: ProfileId) -> AppResult<Vec<Profile>>;

    async fn recommended_friends(&self, profile: ProfileId) -> AppResult<Vec<Profile>>;

    /// Own posts plus friends' posts, newest first; equal timestamps keep insertion order
    async fn news_feed(&self, profile: ProfileId) -> AppResult<Vec<FeedPost>>;

    async fn create_post(
        &self,
        author: ProfileId,
        message: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Post>;

    async fn update_post(&self, author: ProfileId, post: PostId, message: &str)
        -> AppResult<Post>;

    async fn delete_post(&self, author: ProfileId, post: PostId) -> AppResult<()>;

    async fn posts_of(&self, profile: ProfileId) -> AppResult<Vec<Post>>;
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynSocialRepository = Arc<dyn SocialRepository>;

const PROFILE_COLUMNS: &str =
    "id, user_id, first_name, last_name, city, image_url, created_at";

// Ids of everyone sharing an edge with ?1, from both orientations
const FRIEND_IDS: &str = "SELECT profile_b FROM friendships WHERE profile_a = ?1
     UNION
     SELECT profile_a FROM friendships WHERE profile_b = ?1";

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    let created_at: String = row.get(6)?;
    Ok(Profile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        city: row.get(4)?,
        image_url: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    let created_at: String = row.get(3)?;
    Ok(Post {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        message: row.get(2)?,
        created_at: parse_timestamp(3, &created_at)?,
    })
}

fn load_profile(conn: &Connection, id: ProfileId) -> AppResult<Profile> {
    conn.query_row(
        &format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS),
        params![id],
        profile_from_row,
    )
    .or_not_found()
}

fn profile_exists(conn: &Connection, id: ProfileId) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT COUNT(*) > 0 FROM profiles WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?)
}

fn edge_exists(conn: &Connection, me: ProfileId, other: ProfileId) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT COUNT(*) > 0 FROM friendships
         WHERE (profile_a = ?1 AND profile_b = ?2) OR (profile_a = ?2 AND profile_b = ?1)",
        params![me, other],
        |row| row.get(0),
    )?)
}

fn load_post(conn: &Connection, id: PostId) -> AppResult<Post> {
    conn.query_row(
        "SELECT id, profile_id, message, created_at FROM posts WHERE id = ?1",
        params![id],
        post_from_row,
    )
    .or_not_found()
}

/// SQLite implementation
pub struct SqliteSocialRepository {
    pool: DbPool,
}

impl SqliteSocialRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SocialRepository for SqliteSocialRepository {
    async fn create_profile(
        &self,
        new: &NewProfile,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Profile> {
        new.validate()?;
        let conn = self.pool.get()?;

        let inserted = conn.execute(
            "INSERT INTO profiles (user_id, first_name, last_name, city, image_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                new.first_name.trim(),
                new.last_name.trim(),
                new.city.trim(),
                new.image_url.trim(),
                format_timestamp(now)
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if db::is_constraint_violation(&e) => {
                return Err(AppError::BadRequest(
                    "This user already has a profile".into(),
                ))
            }
            Err(e) => return Err(e.into()),
        }

        let id = ProfileId(conn.last_insert_rowid());
        tracing::info!(profile = %id, "Created profile");
        load_profile(&conn, id)
    }

    async fn get_profile(&self, id: ProfileId) -> AppResult<Profile> {
        let conn = self.pool.get()?;
        load_profile(&conn, id)
    }

    async fn profile_for_user(&self, user_id: &str) -> AppResult<Profile> {
        let conn = self.pool.get()?;
        conn.query_row(
            &format!("SELECT {} FROM profiles WHERE user_id = ?1", PROFILE_COLUMNS),
            params![user_id],
            profile_from_row,
        )
        .or_not_found()
    }

    async fn list_profiles(&self) -> AppResult<Vec<Profile>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM profiles ORDER BY id",
            PROFILE_COLUMNS
        ))?;
        let profiles = stmt
            .query_map([], profile_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(profiles)
    }

    async fn update_profile(&self, id: ProfileId, update: &ProfileUpdate) -> AppResult<Profile> {
        let conn = self.pool.get()?;
        let mut profile = load_profile(&conn, id)?;
        update.apply(&mut profile)?;

        conn.execute(
            "UPDATE profiles SET city = ?1, image_url = ?2 WHERE id = ?3",
            params![profile.city, profile.image_url, id],
        )?;
        Ok(profile)
    }

    async fn add_friend(
        &self,
        me: ProfileId,
        other: ProfileId,
        now: DateTime<Utc>,
    ) -> AppResult<FriendOutcome> {
        if me == other {
            tracing::debug!(profile = %me, "Ignoring self friendship");
            return Ok(FriendOutcome::SelfFriendship);
        }

        let conn = self.pool.get()?;
        let outcome = db::immediate(&conn, |conn| -> AppResult<FriendOutcome> {
            if !profile_exists(conn, me)? || !profile_exists(conn, other)? {
                return Err(AppError::NotFound);
            }
            if edge_exists(conn, me, other)? {
                return Ok(FriendOutcome::AlreadyFriends);
            }

            let inserted = conn.execute(
                "INSERT INTO friendships (profile_a, profile_b, created_at) VALUES (?1, ?2, ?3)",
                params![me, other, format_timestamp(now)],
            );
            match inserted {
                Ok(_) => Ok(FriendOutcome::Added),
                // The pair index caught a racing insert
                Err(e) if db::is_constraint_violation(&e) => Ok(FriendOutcome::AlreadyFriends),
                Err(e) => Err(e.into()),
            }
        })?;

        tracing::info!(profile = %me, other = %other, ?outcome, "Add friend");
        Ok(outcome)
    }

    async fn remove_friend(&self, me: ProfileId, other: ProfileId) -> AppResult<bool> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM friendships
             WHERE (profile_a = ?1 AND profile_b = ?2) OR (profile_a = ?2 AND profile_b = ?1)",
            params![me, other],
        )?;
        Ok(rows > 0)
    }

    async fn is_friends_with(&self, me: ProfileId, other: ProfileId) -> AppResult<bool> {
        let conn = self.pool.get()?;
        edge_exists(&conn, me, other)
    }

    async fn friends_of(&self, profile: ProfileId) -> AppResult<Vec<Profile>> {
        let conn = self.pool.get()?;
        if !profile_exists(&conn, profile)? {
            return Err(AppError::NotFound);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM profiles WHERE id IN ({}) ORDER BY id",
            PROFILE_COLUMNS, FRIEND_IDS
        ))?;
        let friends = stmt
            .query_map(params![profile], profile_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(friends)
    }

    async fn recommended_friends(&self, profile: ProfileId) -> AppResult<Vec<Profile>> {
        let friends: HashSet<ProfileId> = self
            .friends_of(profile)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        let everyone = self.list_profiles().await?;
        Ok(recommend(everyone, profile, &friends))
    }

    async fn news_feed(&self, profile: ProfileId) -> AppResult<Vec<FeedPost>> {
        let conn = self.pool.get()?;
        if !profile_exists(&conn, profile)? {
            return Err(AppError::NotFound);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT p.id, p.profile_id, pr.first_name, pr.last_name, p.message, p.created_at
             FROM posts p
             JOIN profiles pr ON pr.id = p.profile_id
             WHERE p.profile_id = ?1 OR p.profile_id IN ({})
             ORDER BY p.created_at DESC, p.id ASC",
            FRIEND_IDS
        ))?;

        let feed = stmt
            .query_map(params![profile], |row| {
                let first: String = row.get(2)?;
                let last: String = row.get(3)?;
                let created_at: String = row.get(5)?;
                Ok(FeedPost {
                    id: row.get(0)?,
                    profile_id: row.get(1)?,
                    author: format!("{} {}", first, last),
                    message: row.get(4)?,
                    created_at: parse_timestamp(5, &created_at)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(feed)
    }

    async fn create_post(
        &self,
        author: ProfileId,
        message: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Post> {
        let message = clean_message(message)?;
        let conn = self.pool.get()?;
        if !profile_exists(&conn, author)? {
            return Err(AppError::NotFound);
        }

        conn.execute(
            "INSERT INTO posts (profile_id, message, created_at) VALUES (?1, ?2, ?3)",
            params![author, message, format_timestamp(now)],
        )?;
        load_post(&conn, PostId(conn.last_insert_rowid()))
    }

    async fn update_post(
        &self,
        author: ProfileId,
        post: PostId,
        message: &str,
    ) -> AppResult<Post> {
        let message = clean_message(message)?;
        let conn = self.pool.get()?;
        let mut existing = load_post(&conn, post)?;
        if existing.profile_id != author {
            return Err(AppError::Forbidden);
        }

        conn.execute(
            "UPDATE posts SET message = ?1 WHERE id = ?2",
            params![message, post],
        )?;
        existing.message = message;
        Ok(existing)
    }

    async fn delete_post(&self, author: ProfileId, post: PostId) -> AppResult<()> {
        let conn = self.pool.get()?;
        let owner: Option<ProfileId> = conn
            .query_row(
                "SELECT profile_id FROM posts WHERE id = ?1",
                params![post],
                |row| row.get(0),
            )
            .optional()?;

        match owner {
            None => Err(AppError::NotFound),
            Some(owner) if owner != author => Err(AppError::Forbidden),
            Some(_) => {
                conn.execute("DELETE FROM posts WHERE id = ?1", params![post])?;
                Ok(())
            }
        }
    }

    async fn posts_of(&self, profile: ProfileId) -> AppResult<Vec<Post>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, profile_id, message, created_at FROM posts
             WHERE profile_id = ?1
             ORDER BY created_at DESC, id ASC",
        )?;
        let posts = stmt
            .query_map(params![profile], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }
}
