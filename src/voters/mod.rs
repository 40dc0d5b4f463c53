pub mod filter;
pub mod repository;

pub use filter::{Election, VoterFilter, VoterParams, VoterQuery};
pub use repository::{
    DynVoterRepository, FilterOptions, NewVoter, SqliteVoterRepository, VoterPage,
    VoterRepository, VoterStats,
};
