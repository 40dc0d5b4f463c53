use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::DbPool;

/// Create a new session for a user. Returns the session token.
pub fn create_session(pool: &DbPool, user_id: &str, hours: u64) -> AppResult<String> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id, token, format!("+{} hours", hours)],
    )?;

    tracing::debug!(user_id, "session created");
    Ok(token)
}

/// Resolve an unexpired session token to its user.
pub fn user_for_token(pool: &DbPool, token: &str) -> AppResult<Option<CurrentUser>> {
    let conn = pool.get()?;
    let user = conn
        .query_row(
            "SELECT u.id, u.username FROM sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > datetime('now')",
            params![token],
            |row| {
                Ok(CurrentUser {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Drop every expired session. Returns how many were removed.
pub fn purge_expired(pool: &DbPool) -> AppResult<usize> {
    let conn = pool.get()?;
    Ok(conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )?)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    fn setup() -> (DbPool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO users (id, username, password_hash, created_at)
                 VALUES ('u1', 'alice', 'x', '2024-01-01T00:00:00.000000Z')",
                [],
            )
            .unwrap();
        (pool, temp_dir)
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }

    #[test]
    fn session_resolves_until_deleted() {
        let (pool, _temp) = setup();
        let token = create_session(&pool, "u1", 1).unwrap();

        let user = user_for_token(&pool, &token).unwrap().unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.username, "alice");

        delete_session(&pool, &token).unwrap();
        assert!(user_for_token(&pool, &token).unwrap().is_none());
    }

    #[test]
    fn expired_sessions_do_not_resolve() {
        let (pool, _temp) = setup();
        let token = create_session(&pool, "u1", 0).unwrap();

        assert!(user_for_token(&pool, &token).unwrap().is_none());
        assert_eq!(purge_expired(&pool).unwrap(), 1);
    }
}
