//! Local SQLite persistence: sync watermark, sample log and cycle journal.

mod connection;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{LocationRecord, Sample, SyncCycleRecord};
pub use repositories::{SampleLogSource, SqliteStateStore};
