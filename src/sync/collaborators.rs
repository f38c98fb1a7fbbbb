//! Interfaces to everything the scheduler does not own: the health store, the
//! backend, durable sync state, location, host execution grants and the clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{GeoFix, MeasurementSnapshot, ProjectId, SyncBatch, UserProfile};

#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Fields available at or before `at`. Any subset may be populated.
    async fn snapshot(&self, at: DateTime<Utc>) -> Result<MeasurementSnapshot>;

    async fn user_profile(&self) -> Result<UserProfile>;
}

#[async_trait]
pub trait UploadClient: Send + Sync {
    /// Delivers the whole batch or fails; there is no partial success.
    async fn send(&self, batch: &SyncBatch) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncState {
    pub last_sync: Option<DateTime<Utc>>,
    pub last_project_id: Option<ProjectId>,
}

#[async_trait]
pub trait SyncStateStore: Send + Sync {
    async fn get(&self) -> Result<SyncState>;

    async fn set(&self, last_sync: DateTime<Utc>, project_id: ProjectId) -> Result<()>;
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Asks the host for a new fix; the result shows up in `last_fix` later.
    async fn request_fix(&self);

    async fn last_fix(&self) -> Option<GeoFix>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionGrant {
    pub id: u64,
    /// Time the host allows before it expires the grant. `None` means unbounded.
    pub budget: Option<Duration>,
}

/// Host OS background-execution grants (begin/end pairs).
pub trait ExecutionGrantor: Send + Sync {
    fn begin(&self) -> ExecutionGrant;

    fn end(&self, id: u64);
}

/// Grantor for hosts that never restrict background time.
#[derive(Debug, Default)]
pub struct UnboundedGrantor;

impl ExecutionGrantor for UnboundedGrantor {
    fn begin(&self) -> ExecutionGrant {
        ExecutionGrant { id: 0, budget: None }
    }

    fn end(&self, _id: u64) {}
}

/// Hands out grants with a fixed budget, for hosts that cap background work
/// per wake-up without telling us through a callback.
#[derive(Debug)]
pub struct BudgetGrantor {
    budget: Duration,
    next_id: AtomicU64,
}

impl BudgetGrantor {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            next_id: AtomicU64::new(1),
        }
    }
}

impl ExecutionGrantor for BudgetGrantor {
    fn begin(&self) -> ExecutionGrant {
        ExecutionGrant {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            budget: Some(self.budget),
        }
    }

    fn end(&self, id: u64) {
        log::debug!("execution grant {id} ended");
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Collaborators injected into a scheduler.
#[derive(Clone)]
pub struct SyncDeps {
    pub source: Arc<dyn MeasurementSource>,
    pub uploader: Arc<dyn UploadClient>,
    pub store: Arc<dyn SyncStateStore>,
    pub location: Option<Arc<dyn LocationProvider>>,
    pub grants: Arc<dyn ExecutionGrantor>,
    pub clock: Arc<dyn Clock>,
}

impl SyncDeps {
    pub fn new(
        source: Arc<dyn MeasurementSource>,
        uploader: Arc<dyn UploadClient>,
        store: Arc<dyn SyncStateStore>,
    ) -> Self {
        Self {
            source,
            uploader,
            store,
            location: None,
            grants: Arc::new(UnboundedGrantor),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_location(mut self, location: Arc<dyn LocationProvider>) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_grantor(mut self, grants: Arc<dyn ExecutionGrantor>) -> Self {
        self.grants = grants;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
