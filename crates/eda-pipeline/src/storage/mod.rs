//! Storage backends: the shared job database, uploaded artifacts and results

mod artifact_store;
pub mod database;
mod local;
mod result_store;

pub use artifact_store::ArtifactStore;
pub use database::{DeadLetter, JobDatabase, QueueCounts, QueueEntryStatus, ReapOutcome};
pub use local::LocalArtifactStore;
pub use result_store::{InMemoryResultStore, ResultStore, SqliteResultStore};
