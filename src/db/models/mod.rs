pub mod sample;
pub mod sync_cycle;

pub use sample::{LocationRecord, Sample};
pub use sync_cycle::SyncCycleRecord;
