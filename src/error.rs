//! Error types for the sync engine.

use chrono::{DateTime, Utc};

/// Failure categories a sync cycle or scheduler command can end with.
///
/// Collaborator errors are flattened to strings so the value can be cloned
/// into status snapshots and broadcast events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// No project id was given and none was stored by a previous run.
    #[error("no project selected")]
    NoProject,

    #[error("sync scheduler already started")]
    AlreadyRunning,

    /// The scheduler task is gone (all handles dropped or it panicked).
    #[error("sync scheduler has shut down")]
    SchedulerGone,

    #[error("sync batch must contain at least one measurement")]
    EmptyBatch,

    #[error("sync batch measurements out of order at {0}")]
    UnorderedBatch(DateTime<Utc>),

    /// User profile / project context could not be fetched.
    #[error("project context unavailable: {0}")]
    Context(String),

    /// Transport or server failure while delivering a batch.
    #[error("upload failed: {0}")]
    Upload(String),

    /// Watermark could not be read or written.
    #[error("sync state store error: {0}")]
    Persist(String),

    /// The host's background execution grant ran out mid-cycle.
    #[error("background execution time expired")]
    GrantExpired,

    #[error("sync stopped")]
    Stopped,

    #[error("internal sync error: {0}")]
    Internal(String),
}

impl SyncError {
    pub(crate) fn context(err: anyhow::Error) -> Self {
        SyncError::Context(format!("{err:#}"))
    }

    pub(crate) fn upload(err: anyhow::Error) -> Self {
        SyncError::Upload(format!("{err:#}"))
    }

    pub(crate) fn persist(err: anyhow::Error) -> Self {
        SyncError::Persist(format!("{err:#}"))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SyncError>;
