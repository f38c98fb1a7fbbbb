#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Timelike, Utc};
use tokio::sync::Notify;
use tokio::time::Instant;

use healthsync_lib::models::{GeoFix, MeasurementKind};
use healthsync_lib::sync::{
    Clock, ExecutionGrant, ExecutionGrantor, LocationProvider, MeasurementSource,
    MemoryStateStore, SyncScheduler, SyncState, SyncStateStore, UploadClient,
};
use healthsync_lib::{MeasurementSnapshot, ProjectId, SyncBatch, SyncStatus, UserProfile};

pub const PROJECT: ProjectId = ProjectId(3);

pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
}

/// Wall clock that moves with tokio's (paused) time.
pub struct TestClock {
    base: DateTime<Utc>,
    origin: Instant,
}

impl TestClock {
    pub fn starting_at(base: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            base,
            origin: Instant::now(),
        })
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(self.origin.elapsed()).unwrap()
    }
}

/// Reports the minute-of-hour as the step count for every timestamp.
#[derive(Default)]
pub struct MinuteSource {
    failing: Mutex<HashSet<DateTime<Utc>>>,
    delay: Mutex<Option<Duration>>,
    profile_unavailable: AtomicBool,
    pub calls: AtomicUsize,
}

impl MinuteSource {
    pub fn fail_at(&self, timestamp: DateTime<Utc>) {
        self.failing.lock().unwrap().insert(timestamp);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_profile_unavailable(&self, unavailable: bool) {
        self.profile_unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl MeasurementSource for MinuteSource {
    async fn snapshot(&self, at: DateTime<Utc>) -> Result<MeasurementSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&at) {
            return Err(anyhow!("health store unavailable"));
        }
        Ok(MeasurementSnapshot::empty(at).with_value(MeasurementKind::StepCount, at.minute() as f64))
    }

    async fn user_profile(&self) -> Result<UserProfile> {
        if self.profile_unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("profile not authorized"));
        }
        Ok(UserProfile {
            user_id: "u-1".into(),
            provider: Some("apple".into()),
            ..UserProfile::default()
        })
    }
}

/// Records every batch it is handed. Results are scripted per call
/// (default success); optionally holds each call until released.
#[derive(Default)]
pub struct RecordingUploader {
    results: Mutex<VecDeque<Result<()>>>,
    batches: Mutex<Vec<SyncBatch>>,
    gated: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl RecordingUploader {
    pub fn gated() -> Self {
        let uploader = Self::default();
        uploader.gated.store(true, Ordering::SeqCst);
        uploader
    }

    pub fn push_result(&self, result: Result<()>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn set_gated(&self, gated: bool) {
        self.gated.store(gated, Ordering::SeqCst);
    }

    /// Waits until a gated upload is in flight.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn batches(&self) -> Vec<SyncBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn timestamps(&self) -> Vec<Vec<DateTime<Utc>>> {
        self.batches()
            .iter()
            .map(|batch| batch.measurements().iter().map(|m| m.timestamp).collect())
            .collect()
    }
}

#[async_trait]
impl UploadClient for RecordingUploader {
    async fn send(&self, batch: &SyncBatch) -> Result<()> {
        self.batches.lock().unwrap().push(batch.clone());
        if self.gated.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let scripted = self.results.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(()))
    }
}

/// Memory store whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStateStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn with_state(state: SyncState) -> Self {
        Self {
            inner: MemoryStateStore::with_state(state),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncStateStore for FlakyStore {
    async fn get(&self) -> Result<SyncState> {
        self.inner.get().await
    }

    async fn set(&self, last_sync: DateTime<Utc>, project_id: ProjectId) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        self.inner.set(last_sync, project_id).await
    }
}

#[derive(Default)]
pub struct CountingGrantor {
    budget: Option<Duration>,
    next_id: AtomicU64,
    pub ended: Mutex<Vec<u64>>,
}

impl CountingGrantor {
    pub fn with_budget(budget: Duration) -> Self {
        Self {
            budget: Some(budget),
            ..Self::default()
        }
    }

    pub fn begun(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    pub fn ended(&self) -> Vec<u64> {
        self.ended.lock().unwrap().clone()
    }
}

impl ExecutionGrantor for CountingGrantor {
    fn begin(&self) -> ExecutionGrant {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        ExecutionGrant {
            id,
            budget: self.budget,
        }
    }

    fn end(&self, id: u64) {
        self.ended.lock().unwrap().push(id);
    }
}

pub struct FixedLocation {
    fix: Option<GeoFix>,
    pub requests: AtomicUsize,
}

impl FixedLocation {
    pub fn new(fix: Option<GeoFix>) -> Self {
        Self {
            fix,
            requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn request_fix(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    async fn last_fix(&self) -> Option<GeoFix> {
        self.fix
    }
}

/// Waits (in paused time) until the scheduler status satisfies `predicate`.
pub async fn wait_for_status<F>(scheduler: &SyncScheduler, predicate: F) -> SyncStatus
where
    F: FnMut(&SyncStatus) -> bool,
{
    let mut rx = scheduler.watch_status();
    let status = tokio::time::timeout(Duration::from_secs(6 * 3600), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for scheduler status")
        .expect("scheduler dropped");
    status.clone()
}

/// Lets aborted tasks unwind on the current-thread runtime.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
