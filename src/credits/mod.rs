pub mod domain;
pub mod repository;

pub use domain::{CheckInOutcome, NewAccount, UnlockOutcome, UnlockState};
pub use repository::{CreditsRepository, DynCreditsRepository, SqliteCreditsRepository};
