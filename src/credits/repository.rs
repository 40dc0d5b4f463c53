// Repository pattern - every balance mutation lives here, inside a transaction
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use std::sync::Arc;

use crate::config::CreditsConfig;
use crate::credits::domain::{
    CheckInOutcome, NewAccount, UnlockOutcome, UnlockPlan, UnlockRequest, UnlockState,
};
use crate::db::models::{Account, AccountId, CheckIn, ReviewId};
use crate::db::{self, format_day, format_timestamp, parse_day, parse_timestamp};
use crate::error::{AppError, AppResult, OptionalRow};
use crate::state::DbPool;

#[async_trait]
pub trait CreditsRepository: Send + Sync {
    /// New account funded with the starting grant
    async fn create_account(
        &self,
        new: &NewAccount,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Account>;

    async fn get_account(&self, id: AccountId) -> AppResult<Account>;

    async fn account_for_user(&self, user_id: &str) -> AppResult<Account>;

    async fn balance(&self, id: AccountId) -> AppResult<i64>;

    /// Grant the daily bonus at most once per (account, day)
    async fn check_in(&self, account: AccountId, today: NaiveDate) -> AppResult<CheckInOutcome>;

    async fn check_ins_of(&self, account: AccountId) -> AppResult<Vec<CheckIn>>;

    /// Pay the review's unlock cost to its owner and record a permanent grant
    async fn unlock(
        &self,
        viewer: AccountId,
        review: ReviewId,
        now: DateTime<Utc>,
    ) -> AppResult<UnlockOutcome>;

    async fn unlock_state(&self, account: AccountId, review: ReviewId) -> AppResult<UnlockState>;

    async fn is_unlocked_for(&self, account: AccountId, review: ReviewId) -> AppResult<bool> {
        Ok(self.unlock_state(account, review).await?.is_unlocked())
    }
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynCreditsRepository = Arc<dyn CreditsRepository>;

const ACCOUNT_COLUMNS: &str = "id, user_id, name, email, college, balance, created_at";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let created_at: String = row.get(6)?;
    Ok(Account {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        college: row.get(4)?,
        balance: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
    })
}

fn load_account(conn: &Connection, id: AccountId) -> AppResult<Account> {
    conn.query_row(
        &format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS),
        params![id],
        account_from_row,
    )
    .or_not_found()
}

fn read_balance(conn: &Connection, id: AccountId) -> AppResult<i64> {
    conn.query_row(
        "SELECT balance FROM accounts WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
    .or_not_found()
}

/// (owner, gated, unlock_cost) of a review
fn review_terms(conn: &Connection, review: ReviewId) -> AppResult<(Option<AccountId>, bool, i64)> {
    conn.query_row(
        "SELECT account_id, gated, unlock_cost FROM reviews WHERE id = ?1",
        params![review],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )
    .or_not_found()
}

fn has_grant(conn: &Connection, account: AccountId, review: ReviewId) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT COUNT(*) > 0 FROM unlock_grants WHERE account_id = ?1 AND review_id = ?2",
        params![account, review],
        |row| row.get(0),
    )?)
}

/// SQLite implementation
pub struct SqliteCreditsRepository {
    pool: DbPool,
    config: CreditsConfig,
}

impl SqliteCreditsRepository {
    pub fn new(pool: DbPool, config: CreditsConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl CreditsRepository for SqliteCreditsRepository {
    async fn create_account(
        &self,
        new: &NewAccount,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Account> {
        new.validate()?;
        let conn = self.pool.get()?;

        let inserted = conn.execute(
            "INSERT INTO accounts (user_id, name, email, college, balance, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                new.name.trim(),
                new.email.trim(),
                new.college.trim(),
                self.config.starting_balance,
                format_timestamp(now)
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if db::is_constraint_violation(&e) => {
                return Err(AppError::BadRequest(
                    "This email or user already has an account".into(),
                ))
            }
            Err(e) => return Err(e.into()),
        }

        let id = AccountId(conn.last_insert_rowid());
        tracing::info!(account = %id, balance = self.config.starting_balance, "Created account");
        load_account(&conn, id)
    }

    async fn get_account(&self, id: AccountId) -> AppResult<Account> {
        let conn = self.pool.get()?;
        load_account(&conn, id)
    }

    async fn account_for_user(&self, user_id: &str) -> AppResult<Account> {
        let conn = self.pool.get()?;
        conn.query_row(
            &format!("SELECT {} FROM accounts WHERE user_id = ?1", ACCOUNT_COLUMNS),
            params![user_id],
            account_from_row,
        )
        .or_not_found()
    }

    async fn balance(&self, id: AccountId) -> AppResult<i64> {
        let conn = self.pool.get()?;
        read_balance(&conn, id)
    }

    async fn check_in(&self, account: AccountId, today: NaiveDate) -> AppResult<CheckInOutcome> {
        let bonus = self.config.check_in_bonus;
        let conn = self.pool.get()?;

        let outcome = db::immediate(&conn, |conn| -> AppResult<CheckInOutcome> {
            let balance = read_balance(conn, account)?;

            // The (account, day) unique key makes a repeat a silent no-op
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO check_ins (account_id, day) VALUES (?1, ?2)",
                params![account, format_day(today)],
            )?;
            if inserted == 0 {
                return Ok(CheckInOutcome::AlreadyCheckedIn { balance });
            }

            conn.execute(
                "UPDATE accounts SET balance = balance + ?1 WHERE id = ?2",
                params![bonus, account],
            )?;
            Ok(CheckInOutcome::Granted {
                balance: balance + bonus,
            })
        })?;

        tracing::info!(account = %account, day = %today, ?outcome, "Check-in");
        Ok(outcome)
    }

    async fn check_ins_of(&self, account: AccountId) -> AppResult<Vec<CheckIn>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT account_id, day FROM check_ins WHERE account_id = ?1 ORDER BY day DESC",
        )?;
        let rows = stmt
            .query_map(params![account], |row| {
                let day: String = row.get(1)?;
                Ok(CheckIn {
                    account_id: row.get(0)?,
                    day: parse_day(1, &day)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn unlock(
        &self,
        viewer: AccountId,
        review: ReviewId,
        now: DateTime<Utc>,
    ) -> AppResult<UnlockOutcome> {
        let conn = self.pool.get()?;

        // ATOMIC TRANSACTION - grant, debit and credit land together or not at all
        let result = db::immediate(&conn, |conn| -> AppResult<UnlockOutcome> {
            let balance = read_balance(conn, viewer)?;
            let (owner, gated, cost) = review_terms(conn, review)?;
            let request = UnlockRequest {
                viewer,
                owner,
                gated,
                cost,
                has_grant: has_grant(conn, viewer, review)?,
                balance,
            };

            match request.plan()? {
                UnlockPlan::Skip(outcome) => Ok(outcome),
                UnlockPlan::Transfer { owner, cost } => {
                    let inserted = conn.execute(
                        "INSERT INTO unlock_grants (account_id, review_id, created_at)
                         VALUES (?1, ?2, ?3)",
                        params![viewer, review, format_timestamp(now)],
                    );
                    match inserted {
                        Ok(_) => {}
                        Err(e) if db::is_constraint_violation(&e) => {
                            return Ok(UnlockOutcome::AlreadyUnlocked)
                        }
                        Err(e) => return Err(e.into()),
                    }

                    conn.execute(
                        "UPDATE accounts SET balance = balance - ?1 WHERE id = ?2",
                        params![cost, viewer],
                    )?;
                    if let Some(owner) = owner {
                        conn.execute(
                            "UPDATE accounts SET balance = balance + ?1 WHERE id = ?2",
                            params![cost, owner],
                        )?;
                    }

                    Ok(UnlockOutcome::Unlocked {
                        balance: balance - cost,
                        cost,
                    })
                }
            }
        });

        match &result {
            Ok(outcome) => {
                tracing::info!(account = %viewer, review = %review, ?outcome, "Unlock")
            }
            Err(AppError::InsufficientCredits { balance, cost }) => tracing::info!(
                account = %viewer,
                review = %review,
                balance,
                cost,
                "Unlock refused: insufficient credits"
            ),
            Err(_) => {}
        }
        result
    }

    async fn unlock_state(&self, account: AccountId, review: ReviewId) -> AppResult<UnlockState> {
        let conn = self.pool.get()?;
        let (owner, gated, _) = review_terms(&conn, review)?;
        let granted = gated && has_grant(&conn, account, review)?;
        Ok(UnlockState::resolve(gated, owner, account, granted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_repo() -> (SqliteCreditsRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        (
            SqliteCreditsRepository::new(pool, CreditsConfig::default()),
            temp_dir,
        )
    }

    async fn make_account(repo: &SqliteCreditsRepository, name: &str) -> AccountId {
        let new = NewAccount {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            college: "BU".to_string(),
        };
        repo.create_account(&new, None, Utc::now()).await.unwrap().id
    }

    fn make_review(
        repo: &SqliteCreditsRepository,
        owner: Option<AccountId>,
        gated: bool,
        cost: i64,
    ) -> ReviewId {
        let conn = repo.pool.get().unwrap();
        conn.execute(
            "INSERT INTO companies (name) VALUES ('Acme')",
            [],
        )
        .unwrap();
        let company = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO reviews (account_id, company_id, role_title, job_type, rating, difficulty, gated, unlock_cost, created_at)
             VALUES (?1, ?2, 'SWE', 'Internship', 4, 3, ?3, ?4, ?5)",
            params![owner, company, gated, cost, format_timestamp(Utc::now())],
        )
        .unwrap();
        ReviewId(conn.last_insert_rowid())
    }

    fn grant_count(repo: &SqliteCreditsRepository) -> i64 {
        let conn = repo.pool.get().unwrap();
        conn.query_row("SELECT COUNT(*) FROM unlock_grants", [], |row| row.get(0))
            .unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, d).unwrap()
    }

    #[tokio::test]
    async fn test_new_account_gets_starting_grant() {
        let (repo, _temp) = create_test_repo();
        let a = make_account(&repo, "Ada").await;
        assert_eq!(repo.balance(a).await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (repo, _temp) = create_test_repo();
        make_account(&repo, "Ada").await;
        let dup = NewAccount {
            name: "Other".into(),
            email: "ada@example.com".into(),
            college: String::new(),
        };
        assert!(matches!(
            repo.create_account(&dup, None, Utc::now()).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_check_in_once_per_day() {
        let (repo, _temp) = create_test_repo();
        let a = make_account(&repo, "Ada").await;

        let first = repo.check_in(a, day(6)).await.unwrap();
        assert_eq!(first, CheckInOutcome::Granted { balance: 550 });

        let second = repo.check_in(a, day(6)).await.unwrap();
        assert_eq!(second, CheckInOutcome::AlreadyCheckedIn { balance: 550 });
        assert_eq!(repo.balance(a).await.unwrap(), 550);
        assert_eq!(repo.check_ins_of(a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_check_in_next_day_grants_again() {
        let (repo, _temp) = create_test_repo();
        let a = make_account(&repo, "Ada").await;

        repo.check_in(a, day(6)).await.unwrap();
        repo.check_in(a, day(7)).await.unwrap();
        assert_eq!(repo.balance(a).await.unwrap(), 600);

        let days: Vec<NaiveDate> = repo
            .check_ins_of(a)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.day)
            .collect();
        assert_eq!(days, vec![day(7), day(6)]);
    }

    #[tokio::test]
    async fn test_check_in_unknown_account() {
        let (repo, _temp) = create_test_repo();
        assert!(matches!(
            repo.check_in(AccountId(42), day(6)).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_unlock_moves_credits() {
        let (repo, _temp) = create_test_repo();
        let a = make_account(&repo, "Ada").await;
        let b = make_account(&repo, "Bob").await;
        let review = make_review(&repo, Some(b), true, 100);

        assert!(!repo.is_unlocked_for(a, review).await.unwrap());

        let outcome = repo.unlock(a, review, Utc::now()).await.unwrap();
        assert_eq!(
            outcome,
            UnlockOutcome::Unlocked {
                balance: 400,
                cost: 100
            }
        );
        assert_eq!(repo.balance(a).await.unwrap(), 400);
        assert_eq!(repo.balance(b).await.unwrap(), 600);
        assert_eq!(grant_count(&repo), 1);
        assert!(repo.is_unlocked_for(a, review).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_with_exact_balance_drains_to_zero() {
        let (repo, _temp) = create_test_repo();
        let a = make_account(&repo, "Ada").await;
        let b = make_account(&repo, "Bob").await;
        let review = make_review(&repo, Some(b), true, 500);

        let outcome = repo.unlock(a, review, Utc::now()).await.unwrap();
        assert_eq!(
            outcome,
            UnlockOutcome::Unlocked {
                balance: 0,
                cost: 500
            }
        );
        assert_eq!(repo.balance(a).await.unwrap(), 0);
        assert_eq!(repo.balance(b).await.unwrap(), 1000);
        assert!(repo.is_unlocked_for(a, review).await.unwrap());
    }

    #[tokio::test]
    async fn test_repeat_unlock_is_free() {
        let (repo, _temp) = create_test_repo();
        let a = make_account(&repo, "Ada").await;
        let b = make_account(&repo, "Bob").await;
        let review = make_review(&repo, Some(b), true, 100);

        repo.unlock(a, review, Utc::now()).await.unwrap();
        let again = repo.unlock(a, review, Utc::now()).await.unwrap();

        assert_eq!(again, UnlockOutcome::AlreadyUnlocked);
        assert_eq!(repo.balance(a).await.unwrap(), 400);
        assert_eq!(repo.balance(b).await.unwrap(), 600);
        assert_eq!(grant_count(&repo), 1);
    }

    #[tokio::test]
    async fn test_insufficient_credits_changes_nothing() {
        let (repo, _temp) = create_test_repo();
        let a = make_account(&repo, "Ada").await;
        let b = make_account(&repo, "Bob").await;
        let review = make_review(&repo, Some(b), true, 501);

        let result = repo.unlock(a, review, Utc::now()).await;
        assert!(matches!(
            result,
            Err(AppError::InsufficientCredits {
                balance: 500,
                cost: 501
            })
        ));
        assert_eq!(repo.balance(a).await.unwrap(), 500);
        assert_eq!(repo.balance(b).await.unwrap(), 500);
        assert_eq!(grant_count(&repo), 0);
        assert_eq!(
            repo.unlock_state(a, review).await.unwrap(),
            UnlockState::Locked
        );
    }

    #[tokio::test]
    async fn test_open_and_own_reviews_never_charge() {
        let (repo, _temp) = create_test_repo();
        let a = make_account(&repo, "Ada").await;
        let open = make_review(&repo, None, false, 0);
        let own = make_review(&repo, Some(a), true, 100);

        assert_eq!(
            repo.unlock(a, open, Utc::now()).await.unwrap(),
            UnlockOutcome::NotGated
        );
        assert_eq!(
            repo.unlock(a, own, Utc::now()).await.unwrap(),
            UnlockOutcome::OwnContent
        );
        assert_eq!(repo.balance(a).await.unwrap(), 500);
        assert!(repo.is_unlocked_for(a, open).await.unwrap());
        assert!(repo.is_unlocked_for(a, own).await.unwrap());
    }

    #[tokio::test]
    async fn test_anonymous_review_debits_only() {
        let (repo, _temp) = create_test_repo();
        let a = make_account(&repo, "Ada").await;
        let review = make_review(&repo, None, true, 30);

        repo.unlock(a, review, Utc::now()).await.unwrap();
        assert_eq!(repo.balance(a).await.unwrap(), 470);
        assert!(repo.is_unlocked_for(a, review).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_missing_review() {
        let (repo, _temp) = create_test_repo();
        let a = make_account(&repo, "Ada").await;
        assert!(matches!(
            repo.unlock(a, ReviewId(77), Utc::now()).await,
            Err(AppError::NotFound)
        ));
    }
}
