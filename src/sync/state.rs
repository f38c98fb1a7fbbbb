use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::ProjectId;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SchedulerState {
    Idle,
    Syncing,
    ArmedWaiting,
    Suspended,
}

impl Default for SchedulerState {
    fn default() -> Self {
        SchedulerState::Idle
    }
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "Idle",
            SchedulerState::Syncing => "Syncing",
            SchedulerState::ArmedWaiting => "ArmedWaiting",
            SchedulerState::Suspended => "Suspended",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay between the end of one cycle and the start of the next
    pub tick_interval: Duration,

    /// Upper bound on snapshots per upload request
    pub max_batch_size: usize,

    /// A source call slower than this counts as absent data
    pub source_timeout: Duration,

    /// Location fix polling before each collection pass
    pub location_fix_attempts: u32,
    pub location_poll_interval: Duration,
    pub location_max_age: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            max_batch_size: 60,
            source_timeout: Duration::from_secs(10),
            location_fix_attempts: 5,
            location_poll_interval: Duration::from_secs(1),
            location_max_age: Duration::from_secs(120),
        }
    }
}

/// What one cycle did, including batches committed before an interruption.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub project_id: ProjectId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub planned: usize,
    pub uploaded: usize,
    pub batches: usize,
    /// Watermark after the last committed batch of this cycle.
    pub watermark: Option<DateTime<Utc>>,
}

impl CycleReport {
    pub fn new(cycle_id: Uuid, project_id: ProjectId, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            project_id,
            started_at,
            finished_at: None,
            planned: 0,
            uploaded: 0,
            batches: 0,
            watermark: None,
        }
    }

    pub(crate) fn record_batch(&mut self, size: usize, watermark: DateTime<Utc>) {
        self.uploaded += size;
        self.batches += 1;
        self.watermark = Some(watermark);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Every planned snapshot was delivered.
    Completed(CycleReport),
    /// The watermark is less than a minute old.
    NothingToSync(CycleReport),
    /// A lock notification cut the cycle short. Not an error.
    Suspended(CycleReport),
    Failed { error: SyncError, report: CycleReport },
}

impl CycleOutcome {
    pub fn report(&self) -> &CycleReport {
        match self {
            CycleOutcome::Completed(report)
            | CycleOutcome::NothingToSync(report)
            | CycleOutcome::Suspended(report)
            | CycleOutcome::Failed { report, .. } => report,
        }
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            CycleOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CycleOutcome::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Completed(_) => "Completed",
            CycleOutcome::NothingToSync(_) => "NothingToSync",
            CycleOutcome::Suspended(_) => "Suspended",
            CycleOutcome::Failed { .. } => "Failed",
        }
    }
}

/// Polled view of the scheduler.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    pub state: SchedulerState,
    pub locked: bool,
    pub project_id: Option<ProjectId>,
    pub next_tick_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<CycleOutcome>,
    pub cycles_started: u64,
    /// Finished without error: completed, suspended by a lock, or nothing to do.
    pub cycles_ok: u64,
    pub cycles_failed: u64,
}

impl SyncStatus {
    pub fn cycles_finished(&self) -> u64 {
        self.cycles_ok + self.cycles_failed
    }
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    StateChanged(SchedulerState),
    LockChanged(bool),
    CycleStarted {
        cycle_id: Uuid,
        project_id: ProjectId,
    },
    BatchUploaded {
        cycle_id: Uuid,
        size: usize,
        watermark: DateTime<Utc>,
    },
    CycleFinished(CycleOutcome),
}
