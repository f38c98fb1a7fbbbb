mod samples;
mod sync_cycles;
mod sync_state;

pub use samples::SampleLogSource;
pub use sync_state::SqliteStateStore;
