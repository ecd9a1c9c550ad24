pub mod index;
pub mod repo;
pub mod row;
pub mod wal;

pub use repo::{CommitSummary, RepoError, Repository, StoreTransaction};
