// Username/password identity: bcrypt hashes, uuid v7 user ids
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Deserialize;

use crate::db::{self, format_timestamp};
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 32;
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    fn validate(&self) -> AppResult<&str> {
        let username = self.username.trim();
        let len = username.chars().count();
        if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
            return Err(AppError::BadRequest(format!(
                "Username must be {}-{} characters",
                MIN_USERNAME_LEN, MAX_USERNAME_LEN
            )));
        }
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(AppError::BadRequest(
                "Username may only contain letters, digits, '_' and '-'".into(),
            ));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::BadRequest(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(username)
    }
}

/// Register a new user. Usernames are unique.
pub fn signup(
    pool: &DbPool,
    credentials: &Credentials,
    cost: u32,
    now: DateTime<Utc>,
) -> AppResult<User> {
    let username = credentials.validate()?;
    let password_hash = bcrypt::hash(&credentials.password, cost)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    let id = uuid::Uuid::now_v7().to_string();

    let conn = pool.get()?;
    match conn.execute(
        "INSERT INTO users (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![id, username, password_hash, format_timestamp(now)],
    ) {
        Ok(_) => {}
        Err(e) if db::is_constraint_violation(&e) => {
            return Err(AppError::BadRequest("Username is already taken".into()));
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(username, "user signed up");
    Ok(User {
        id,
        username: username.to_string(),
        password_hash,
        created_at: now,
    })
}

/// Check credentials. Unknown users and wrong passwords are indistinguishable.
pub fn verify(pool: &DbPool, credentials: &Credentials) -> AppResult<String> {
    let conn = pool.get()?;
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE username = ?1",
            params![credentials.username.trim()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (user_id, password_hash) = row.ok_or(AppError::Unauthorized)?;
    let matches = bcrypt::verify(&credentials.password, &password_hash)
        .map_err(|e| AppError::Internal(format!("Failed to verify password: {}", e)))?;

    if matches {
        Ok(user_id)
    } else {
        Err(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // Minimum bcrypt cost keeps the tests fast
    const TEST_COST: u32 = 4;

    fn setup() -> (DbPool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        (pool, temp_dir)
    }

    fn creds(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn signup_then_verify() {
        let (pool, _temp) = setup();
        let user = signup(&pool, &creds(" alice ", "hunter2hunter2"), TEST_COST, Utc::now()).unwrap();
        assert_eq!(user.username, "alice");
        assert_ne!(user.password_hash, "hunter2hunter2");

        let id = verify(&pool, &creds("alice", "hunter2hunter2")).unwrap();
        assert_eq!(id, user.id);
    }

    #[test]
    fn wrong_password_and_unknown_user_are_unauthorized() {
        let (pool, _temp) = setup();
        signup(&pool, &creds("alice", "hunter2hunter2"), TEST_COST, Utc::now()).unwrap();

        assert!(matches!(
            verify(&pool, &creds("alice", "wrong-password")),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            verify(&pool, &creds("bob", "hunter2hunter2")),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let (pool, _temp) = setup();
        signup(&pool, &creds("alice", "hunter2hunter2"), TEST_COST, Utc::now()).unwrap();
        let again = signup(&pool, &creds("alice", "another-password"), TEST_COST, Utc::now());
        assert!(matches!(again, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn invalid_credentials_are_rejected() {
        let (pool, _temp) = setup();
        for (username, password) in [("al", "longenough"), ("al ice", "longenough"), ("alice", "short")] {
            let result = signup(&pool, &creds(username, password), TEST_COST, Utc::now());
            assert!(matches!(result, Err(AppError::BadRequest(_))), "{}", username);
        }
    }
}
