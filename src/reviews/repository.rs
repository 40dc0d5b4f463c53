use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::db::models::{AccountId, Company, CompanyId, Review, ReviewId};
use crate::db::{format_timestamp, parse_timestamp};
use crate::error::{AppError, AppResult, OptionalRow};
use crate::reviews::domain::{CompanySummary, NewCompany, NewReview, Reaction, ReactionCounts};
use crate::state::DbPool;

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn create_company(&self, new: &NewCompany) -> AppResult<Company>;

    async fn get_company(&self, id: CompanyId) -> AppResult<Company>;

    async fn list_companies(&self) -> AppResult<Vec<Company>>;

    /// Case-insensitive substring match on name; an empty query matches nothing
    async fn search_companies(&self, query: &str) -> AppResult<Vec<Company>>;

    async fn create_review(
        &self,
        author: Option<AccountId>,
        company: CompanyId,
        new: &NewReview,
        now: DateTime<Utc>,
    ) -> AppResult<Review>;

    async fn get_review(&self, id: ReviewId) -> AppResult<Review>;

    async fn reviews_for_company(&self, company: CompanyId) -> AppResult<Vec<Review>>;

    async fn delete_review(&self, author: AccountId, review: ReviewId) -> AppResult<()>;

    async fn company_summary(&self, company: CompanyId) -> AppResult<CompanySummary>;

    /// Reviews of `company` that `account` holds an unlock grant for
    async fn granted_reviews(
        &self,
        account: AccountId,
        company: CompanyId,
    ) -> AppResult<HashSet<ReviewId>>;

    /// Record `account`'s like or dislike, replacing any earlier reaction
    async fn react(
        &self,
        account: AccountId,
        review: ReviewId,
        reaction: Reaction,
        now: DateTime<Utc>,
    ) -> AppResult<ReactionCounts>;

    async fn clear_reaction(&self, account: AccountId, review: ReviewId)
        -> AppResult<ReactionCounts>;

    /// Like and dislike totals for every reacted-to review of `company`
    async fn reaction_counts(
        &self,
        company: CompanyId,
    ) -> AppResult<HashMap<ReviewId, ReactionCounts>>;
}

pub type DynReviewRepository = Arc<dyn ReviewRepository>;

const REVIEW_COLUMNS: &str = "id, account_id, company_id, role_title, job_type, body, rating, \
     difficulty, gated, unlock_cost, created_at";

fn company_from_row(row: &Row<'_>) -> rusqlite::Result<Company> {
    Ok(Company {
        id: row.get(0)?,
        name: row.get(1)?,
        industry: row.get(2)?,
        location: row.get(3)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    let created_at: String = row.get(10)?;
    Ok(Review {
        id: row.get(0)?,
        account_id: row.get(1)?,
        company_id: row.get(2)?,
        role_title: row.get(3)?,
        job_type: row.get(4)?,
        body: row.get(5)?,
        rating: row.get(6)?,
        difficulty: row.get(7)?,
        gated: row.get(8)?,
        unlock_cost: row.get(9)?,
        created_at: parse_timestamp(10, &created_at)?,
    })
}

fn load_company(conn: &Connection, id: CompanyId) -> AppResult<Company> {
    conn.query_row(
        "SELECT id, name, industry, location FROM companies WHERE id = ?1",
        params![id],
        company_from_row,
    )
    .or_not_found()
}

fn load_review(conn: &Connection, id: ReviewId) -> AppResult<Review> {
    conn.query_row(
        &format!("SELECT {} FROM reviews WHERE id = ?1", REVIEW_COLUMNS),
        params![id],
        review_from_row,
    )
    .or_not_found()
}

fn counts_for(conn: &Connection, review: ReviewId) -> AppResult<ReactionCounts> {
    let counts = conn.query_row(
        "SELECT COALESCE(SUM(kind = 'like'), 0), COALESCE(SUM(kind = 'dislike'), 0)
         FROM review_reactions WHERE review_id = ?1",
        params![review],
        |row| {
            Ok(ReactionCounts {
                likes: row.get(0)?,
                dislikes: row.get(1)?,
            })
        },
    )?;
    Ok(counts)
}

/// Escape LIKE wildcards so user input matches literally.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

pub struct SqliteReviewRepository {
    pool: DbPool,
}

impl SqliteReviewRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewRepository for SqliteReviewRepository {
    async fn create_company(&self, new: &NewCompany) -> AppResult<Company> {
        new.validate()?;
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO companies (name, industry, location) VALUES (?1, ?2, ?3)",
            params![new.name.trim(), new.industry.trim(), new.location.trim()],
        )?;
        load_company(&conn, CompanyId(conn.last_insert_rowid()))
    }

    async fn get_company(&self, id: CompanyId) -> AppResult<Company> {
        let conn = self.pool.get()?;
        load_company(&conn, id)
    }

    async fn list_companies(&self) -> AppResult<Vec<Company>> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT id, name, industry, location FROM companies ORDER BY name, id")?;
        let companies = stmt
            .query_map([], company_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(companies)
    }

    async fn search_companies(&self, query: &str) -> AppResult<Vec<Company>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, industry, location FROM companies
             WHERE name LIKE ?1 ESCAPE '\\'
             ORDER BY name, id",
        )?;
        let companies = stmt
            .query_map(params![like_pattern(query)], company_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(companies)
    }

    async fn create_review(
        &self,
        author: Option<AccountId>,
        company: CompanyId,
        new: &NewReview,
        now: DateTime<Utc>,
    ) -> AppResult<Review> {
        new.validate()?;
        let conn = self.pool.get()?;
        load_company(&conn, company)?;

        // Open reviews carry no price
        let cost = if new.gated { new.unlock_cost } else { 0 };
        conn.execute(
            "INSERT INTO reviews (account_id, company_id, role_title, job_type, body, rating,
                                  difficulty, gated, unlock_cost, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                author,
                company,
                new.role_title.trim(),
                new.job_type,
                new.body.trim(),
                new.rating,
                new.difficulty,
                new.gated,
                cost,
                format_timestamp(now)
            ],
        )?;

        let id = ReviewId(conn.last_insert_rowid());
        tracing::info!(review = %id, company = %company, gated = new.gated, "Created review");
        load_review(&conn, id)
    }

    async fn get_review(&self, id: ReviewId) -> AppResult<Review> {
        let conn = self.pool.get()?;
        load_review(&conn, id)
    }

    async fn reviews_for_company(&self, company: CompanyId) -> AppResult<Vec<Review>> {
        let conn = self.pool.get()?;
        load_company(&conn, company)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reviews WHERE company_id = ?1 ORDER BY created_at DESC, id DESC",
            REVIEW_COLUMNS
        ))?;
        let reviews = stmt
            .query_map(params![company], review_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reviews)
    }

    async fn delete_review(&self, author: AccountId, review: ReviewId) -> AppResult<()> {
        let conn = self.pool.get()?;
        let owner: Option<Option<AccountId>> = conn
            .query_row(
                "SELECT account_id FROM reviews WHERE id = ?1",
                params![review],
                |row| row.get(0),
            )
            .optional()?;

        match owner {
            None => Err(AppError::NotFound),
            Some(owner) if owner != Some(author) => Err(AppError::Forbidden),
            Some(_) => {
                conn.execute("DELETE FROM reviews WHERE id = ?1", params![review])?;
                Ok(())
            }
        }
    }

    async fn company_summary(&self, company: CompanyId) -> AppResult<CompanySummary> {
        let conn = self.pool.get()?;
        load_company(&conn, company)?;
        let summary = conn.query_row(
            "SELECT COUNT(*), AVG(rating), AVG(difficulty) FROM reviews WHERE company_id = ?1",
            params![company],
            |row| {
                Ok(CompanySummary {
                    review_count: row.get(0)?,
                    average_rating: row.get(1)?,
                    average_difficulty: row.get(2)?,
                })
            },
        )?;
        Ok(summary)
    }

    async fn granted_reviews(
        &self,
        account: AccountId,
        company: CompanyId,
    ) -> AppResult<HashSet<ReviewId>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT g.review_id FROM unlock_grants g
             JOIN reviews r ON r.id = g.review_id
             WHERE g.account_id = ?1 AND r.company_id = ?2",
        )?;
        let ids = stmt
            .query_map(params![account, company], |row| row.get(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    async fn react(
        &self,
        account: AccountId,
        review: ReviewId,
        reaction: Reaction,
        now: DateTime<Utc>,
    ) -> AppResult<ReactionCounts> {
        let conn = self.pool.get()?;
        load_review(&conn, review)?;
        conn.execute(
            "INSERT INTO review_reactions (account_id, review_id, kind, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (account_id, review_id) DO UPDATE SET kind = excluded.kind",
            params![account, review, reaction.as_str(), format_timestamp(now)],
        )?;
        tracing::debug!(review = %review, account = %account, kind = reaction.as_str(), "Reacted");
        counts_for(&conn, review)
    }

    async fn clear_reaction(
        &self,
        account: AccountId,
        review: ReviewId,
    ) -> AppResult<ReactionCounts> {
        let conn = self.pool.get()?;
        load_review(&conn, review)?;
        conn.execute(
            "DELETE FROM review_reactions WHERE account_id = ?1 AND review_id = ?2",
            params![account, review],
        )?;
        counts_for(&conn, review)
    }

    async fn reaction_counts(
        &self,
        company: CompanyId,
    ) -> AppResult<HashMap<ReviewId, ReactionCounts>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT x.review_id, SUM(x.kind = 'like'), SUM(x.kind = 'dislike')
             FROM review_reactions x
             JOIN reviews r ON r.id = x.review_id
             WHERE r.company_id = ?1
             GROUP BY x.review_id",
        )?;
        let counts = stmt
            .query_map(params![company], |row| {
                Ok((
                    row.get(0)?,
                    ReactionCounts {
                        likes: row.get(1)?,
                        dislikes: row.get(2)?,
                    },
                ))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(counts)
    }
}
