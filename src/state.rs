use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::Arc;

use crate::config::Config;
use crate::credits::{DynCreditsRepository, SqliteCreditsRepository};
use crate::reviews::{DynReviewRepository, SqliteReviewRepository};
use crate::social::{DynSocialRepository, SqliteSocialRepository};
use crate::voters::{DynVoterRepository, SqliteVoterRepository};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub social: DynSocialRepository,
    pub credits: DynCreditsRepository,
    pub reviews: DynReviewRepository,
    pub voters: DynVoterRepository,
}

impl AppState {
    /// Wire the SQLite repositories over a migrated pool.
    pub fn new(db: DbPool, config: Config) -> Self {
        Self {
            social: Arc::new(SqliteSocialRepository::new(db.clone())),
            credits: Arc::new(SqliteCreditsRepository::new(db.clone(), config.credits)),
            reviews: Arc::new(SqliteReviewRepository::new(db.clone())),
            voters: Arc::new(SqliteVoterRepository::new(db.clone())),
            db,
            config,
        }
    }
}
