use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::models::{Voter, VoterId};
use crate::db::{format_day, parse_day};
use crate::error::{AppResult, OptionalRow};
use crate::state::DbPool;
use crate::voters::filter::{Election, VoterFilter, VoterQuery};

pub const PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct NewVoter {
    pub last_name: String,
    pub first_name: String,
    pub date_of_birth: NaiveDate,
    pub date_of_registration: NaiveDate,
    pub party_affiliation: String,
    pub precinct_number: String,
    pub street_number: String,
    pub street_name: String,
    pub apartment_number: Option<String>,
    pub zip_code: String,
    #[serde(default)]
    pub elections: Vec<Election>,
    pub voter_score: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoterPage {
    pub voters: Vec<Voter>,
    pub page: u32,
    pub pages: u32,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoterStats {
    /// (year of birth, voters), ascending by year
    pub by_birth_year: Vec<(i32, i64)>,
    /// (party, voters), ascending by party
    pub by_party: Vec<(String, i64)>,
    /// Voters who took part in each election
    pub election_participation: Vec<(Election, i64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOptions {
    pub parties: Vec<String>,
    pub birth_years: Vec<i32>,
    pub voter_scores: Vec<i64>,
    pub elections: Vec<Election>,
}

#[async_trait]
pub trait VoterRepository: Send + Sync {
    async fn insert(&self, voter: &NewVoter) -> AppResult<VoterId>;

    async fn get(&self, id: VoterId) -> AppResult<Voter>;

    /// One page (1-based) of voters matching `filter`, by name
    async fn list(&self, filter: &VoterFilter, page: u32) -> AppResult<VoterPage>;

    async fn stats(&self, filter: &VoterFilter) -> AppResult<VoterStats>;

    /// Distinct values for populating filter controls
    async fn filter_options(&self) -> AppResult<FilterOptions>;
}

pub type DynVoterRepository = Arc<dyn VoterRepository>;

const VOTER_COLUMNS: &str = "id, last_name, first_name, date_of_birth, date_of_registration, \
     party_affiliation, precinct_number, street_number, street_name, apartment_number, zip_code, \
     v20state, v21town, v21primary, v22general, v23town, voter_score";

fn voter_from_row(row: &Row<'_>) -> rusqlite::Result<Voter> {
    let dob: String = row.get(3)?;
    let registered: String = row.get(4)?;
    Ok(Voter {
        id: row.get(0)?,
        last_name: row.get(1)?,
        first_name: row.get(2)?,
        date_of_birth: parse_day(3, &dob)?,
        date_of_registration: parse_day(4, &registered)?,
        party_affiliation: row.get(5)?,
        precinct_number: row.get(6)?,
        street_number: row.get(7)?,
        street_name: row.get(8)?,
        apartment_number: row.get(9)?,
        zip_code: row.get(10)?,
        v20state: row.get(11)?,
        v21town: row.get(12)?,
        v21primary: row.get(13)?,
        v22general: row.get(14)?,
        v23town: row.get(15)?,
        voter_score: row.get(16)?,
    })
}

fn count_matching(conn: &Connection, query: &VoterQuery) -> AppResult<i64> {
    Ok(conn.query_row(
        &format!("SELECT COUNT(*) FROM voters{}", query.where_clause()),
        params_from_iter(query.params()),
        |row| row.get(0),
    )?)
}

pub struct SqliteVoterRepository {
    pool: DbPool,
}

impl SqliteVoterRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VoterRepository for SqliteVoterRepository {
    async fn insert(&self, voter: &NewVoter) -> AppResult<VoterId> {
        let voted = |e: Election| voter.elections.contains(&e);
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO voters (last_name, first_name, date_of_birth, date_of_registration,
                 party_affiliation, precinct_number, street_number, street_name,
                 apartment_number, zip_code, v20state, v21town, v21primary, v22general,
                 v23town, voter_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                voter.last_name.trim(),
                voter.first_name.trim(),
                format_day(voter.date_of_birth),
                format_day(voter.date_of_registration),
                voter.party_affiliation.trim(),
                voter.precinct_number.trim(),
                voter.street_number.trim(),
                voter.street_name.trim(),
                voter
                    .apartment_number
                    .as_deref()
                    .map(str::trim)
                    .filter(|a| !a.is_empty()),
                voter.zip_code.trim(),
                voted(Election::V20State),
                voted(Election::V21Town),
                voted(Election::V21Primary),
                voted(Election::V22General),
                voted(Election::V23Town),
                voter.voter_score,
            ],
        )?;
        Ok(VoterId(conn.last_insert_rowid()))
    }

    async fn get(&self, id: VoterId) -> AppResult<Voter> {
        let conn = self.pool.get()?;
        conn.query_row(
            &format!("SELECT {} FROM voters WHERE id = ?1", VOTER_COLUMNS),
            params![id],
            voter_from_row,
        )
        .or_not_found()
    }

    async fn list(&self, filter: &VoterFilter, page: u32) -> AppResult<VoterPage> {
        let query = VoterQuery::from_filter(filter);
        let conn = self.pool.get()?;

        let total = count_matching(&conn, &query)?;
        let pages = ((total.max(0) as u64).div_ceil(PAGE_SIZE as u64)).max(1) as u32;
        let page = page.clamp(1, pages);
        let offset = (page - 1) * PAGE_SIZE;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM voters{} ORDER BY last_name, first_name, id LIMIT {} OFFSET {}",
            VOTER_COLUMNS,
            query.where_clause(),
            PAGE_SIZE,
            offset
        ))?;
        let voters = stmt
            .query_map(params_from_iter(query.params()), voter_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(VoterPage {
            voters,
            page,
            pages,
            total,
        })
    }

    async fn stats(&self, filter: &VoterFilter) -> AppResult<VoterStats> {
        let query = VoterQuery::from_filter(filter);
        let where_clause = query.where_clause();
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT CAST(substr(date_of_birth, 1, 4) AS INTEGER) AS year, COUNT(*)
             FROM voters{} GROUP BY year ORDER BY year",
            where_clause
        ))?;
        let by_birth_year = stmt
            .query_map(params_from_iter(query.params()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT party_affiliation, COUNT(*) FROM voters{}
             GROUP BY party_affiliation ORDER BY party_affiliation",
            where_clause
        ))?;
        let by_party = stmt
            .query_map(params_from_iter(query.params()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let sums = Election::ALL
            .iter()
            .map(|e| format!("COALESCE(SUM({}), 0)", e.column()))
            .collect::<Vec<_>>()
            .join(", ");
        let totals: Vec<i64> = conn.query_row(
            &format!("SELECT {} FROM voters{}", sums, where_clause),
            params_from_iter(query.params()),
            |row| (0..Election::ALL.len()).map(|i| row.get(i)).collect(),
        )?;
        let election_participation = Election::ALL.into_iter().zip(totals).collect();

        Ok(VoterStats {
            by_birth_year,
            by_party,
            election_participation,
        })
    }

    async fn filter_options(&self) -> AppResult<FilterOptions> {
        let conn = self.pool.get()?;

        let mut stmt = conn
            .prepare("SELECT DISTINCT party_affiliation FROM voters ORDER BY party_affiliation")?;
        let parties = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT DISTINCT CAST(substr(date_of_birth, 1, 4) AS INTEGER) AS year
             FROM voters ORDER BY year",
        )?;
        let birth_years = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i32>, _>>()?;

        let mut stmt =
            conn.prepare("SELECT DISTINCT voter_score FROM voters ORDER BY voter_score")?;
        let voter_scores = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;

        Ok(FilterOptions {
            parties,
            birth_years,
            voter_scores,
            elections: Election::ALL.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    fn create_test_repo() -> (SqliteVoterRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        (SqliteVoterRepository::new(pool), temp_dir)
    }

    fn voter(last: &str, party: &str, born: i32, elections: Vec<Election>) -> NewVoter {
        NewVoter {
            last_name: last.to_string(),
            first_name: "Pat".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(born, 6, 15).unwrap(),
            date_of_registration: NaiveDate::from_ymd_opt(2010, 1, 4).unwrap(),
            party_affiliation: party.to_string(),
            precinct_number: "7".to_string(),
            street_number: "12".to_string(),
            street_name: "Main St".to_string(),
            apartment_number: Some(" ".to_string()),
            zip_code: "02134".to_string(),
            voter_score: elections.len() as i64,
            elections,
        }
    }

    async fn seed(repo: &SqliteVoterRepository) {
        use Election::*;
        repo.insert(&voter("Adams", "D", 1950, vec![V20State, V22General]))
            .await
            .unwrap();
        repo.insert(&voter("Baker", "R", 1975, vec![V20State]))
            .await
            .unwrap();
        repo.insert(&voter("Clark", "D", 1975, vec![]))
            .await
            .unwrap();
        repo.insert(&voter("Davis", "U", 1990, vec![V20State, V21Town, V23Town]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (repo, _temp) = create_test_repo();
        let id = repo
            .insert(&voter("Adams", "D", 1950, vec![Election::V22General]))
            .await
            .unwrap();

        let stored = repo.get(id).await.unwrap();
        assert_eq!(stored.last_name, "Adams");
        assert_eq!(stored.date_of_birth, NaiveDate::from_ymd_opt(1950, 6, 15).unwrap());
        assert_eq!(stored.apartment_number, None);
        assert!(stored.v22general);
        assert!(!stored.v20state);
    }

    #[tokio::test]
    async fn test_get_missing_voter() {
        let (repo, _temp) = create_test_repo();
        let result = repo.get(VoterId(404)).await;
        assert!(matches!(result, Err(crate::error::AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_by_name() {
        let (repo, _temp) = create_test_repo();
        seed(&repo).await;

        let all = repo.list(&VoterFilter::default(), 1).await.unwrap();
        assert_eq!(all.total, 4);
        let names: Vec<_> = all.voters.iter().map(|v| v.last_name.as_str()).collect();
        assert_eq!(names, vec!["Adams", "Baker", "Clark", "Davis"]);

        let filter = VoterFilter {
            party: Some("D".into()),
            min_birth_year: Some(1970),
            ..Default::default()
        };
        let page = repo.list(&filter, 1).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.voters[0].last_name, "Clark");

        let filter = VoterFilter {
            elections: vec![Election::V20State],
            max_birth_year: Some(1975),
            ..Default::default()
        };
        let page = repo.list(&filter, 1).await.unwrap();
        let names: Vec<_> = page.voters.iter().map(|v| v.last_name.as_str()).collect();
        assert_eq!(names, vec!["Adams", "Baker"]);
    }

    #[tokio::test]
    async fn test_list_pages_by_hundred() {
        let (repo, _temp) = create_test_repo();
        for i in 0..150 {
            repo.insert(&voter(&format!("Voter{:03}", i), "D", 1980, vec![]))
                .await
                .unwrap();
        }

        let first = repo.list(&VoterFilter::default(), 1).await.unwrap();
        assert_eq!(first.pages, 2);
        assert_eq!(first.voters.len(), PAGE_SIZE as usize);

        let second = repo.list(&VoterFilter::default(), 2).await.unwrap();
        assert_eq!(second.voters.len(), 50);
        assert_eq!(second.voters[0].last_name, "Voter100");

        // Out-of-range pages clamp to the last page
        let clamped = repo.list(&VoterFilter::default(), 9).await.unwrap();
        assert_eq!(clamped.page, 2);
    }

    #[tokio::test]
    async fn test_empty_roll_has_one_empty_page() {
        let (repo, _temp) = create_test_repo();
        let page = repo.list(&VoterFilter::default(), 0).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.pages, 1);
        assert!(page.voters.is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let (repo, _temp) = create_test_repo();
        seed(&repo).await;

        let stats = repo.stats(&VoterFilter::default()).await.unwrap();
        assert_eq!(stats.by_birth_year, vec![(1950, 1), (1975, 2), (1990, 1)]);
        assert_eq!(
            stats.by_party,
            vec![("D".to_string(), 2), ("R".to_string(), 1), ("U".to_string(), 1)]
        );
        assert_eq!(
            stats.election_participation,
            vec![
                (Election::V20State, 3),
                (Election::V21Town, 1),
                (Election::V21Primary, 0),
                (Election::V22General, 1),
                (Election::V23Town, 1),
            ]
        );

        let democrats = VoterFilter {
            party: Some("D".into()),
            ..Default::default()
        };
        let stats = repo.stats(&democrats).await.unwrap();
        assert_eq!(stats.by_party, vec![("D".to_string(), 2)]);
        assert_eq!(stats.election_participation[0], (Election::V20State, 1));
    }

    #[tokio::test]
    async fn test_stats_on_empty_roll() {
        let (repo, _temp) = create_test_repo();
        let stats = repo.stats(&VoterFilter::default()).await.unwrap();
        assert!(stats.by_birth_year.is_empty());
        assert!(stats
            .election_participation
            .iter()
            .all(|(_, count)| *count == 0));
    }

    #[tokio::test]
    async fn test_filter_options() {
        let (repo, _temp) = create_test_repo();
        seed(&repo).await;

        let options = repo.filter_options().await.unwrap();
        assert_eq!(options.parties, vec!["D", "R", "U"]);
        assert_eq!(options.birth_years, vec![1950, 1975, 1990]);
        assert_eq!(options.voter_scores, vec![0, 1, 2, 3]);
        assert_eq!(options.elections.len(), 5);
    }
}
