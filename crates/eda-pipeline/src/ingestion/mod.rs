//! Dataset ingestion: turning uploaded bytes into a typed table

mod loader;

pub use loader::{DatasetFormat, DatasetLoader};
