//! Periodic background sync: backfill planning, the per-cycle pipeline and the
//! scheduler loop that re-arms it.

pub mod collaborators;
mod cycle;
pub mod grant;
pub mod planner;
pub mod scheduler;
pub mod state;
pub mod store;

pub use collaborators::{
    BudgetGrantor, Clock, ExecutionGrant, ExecutionGrantor, LocationProvider, MeasurementSource,
    SyncDeps, SyncState, SyncStateStore, SystemClock, UnboundedGrantor, UploadClient,
};
pub use grant::GrantGuard;
pub use planner::plan_backfill;
pub use scheduler::SyncScheduler;
pub use state::{
    CycleOutcome, CycleReport, SchedulerConfig, SchedulerState, SyncEvent, SyncStatus,
};
pub use store::MemoryStateStore;
