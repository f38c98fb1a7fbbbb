mod common;

use std::sync::Arc;

use tokio::sync::mpsc;

use common::*;
use healthsync_lib::daemon::{supervise, HostSignal};
use healthsync_lib::sync::{
    CycleOutcome, MemoryStateStore, SchedulerConfig, SyncDeps, SyncScheduler, SyncState,
};
use healthsync_lib::SchedulerState;

fn scheduler(
    uploader: Arc<RecordingUploader>,
    store: Arc<MemoryStateStore>,
    config: SchedulerConfig,
) -> SyncScheduler {
    let deps = SyncDeps::new(Arc::new(MinuteSource::default()), uploader, store)
        .with_clock(TestClock::starting_at(at(10, 4, 0)));
    SyncScheduler::spawn(deps, config)
}

#[tokio::test(start_paused = true)]
async fn lock_signal_reaches_the_first_cycle() {
    let uploader = Arc::new(RecordingUploader::gated());
    let store = Arc::new(MemoryStateStore::with_state(SyncState {
        last_sync: Some(at(10, 0, 0)),
        last_project_id: Some(PROJECT),
    }));
    let config = SchedulerConfig {
        max_batch_size: 2,
        ..SchedulerConfig::default()
    };
    let scheduler = scheduler(uploader.clone(), store.clone(), config);

    let (signals, signal_rx) = mpsc::unbounded_channel();
    let daemon = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { supervise(&scheduler, None, signal_rx).await }
    });

    uploader.entered().await;
    signals.send(HostSignal::Lock).unwrap();
    wait_for_status(&scheduler, |s| {
        s.locked && s.state == SchedulerState::Suspended
    })
    .await;
    uploader.release();

    let status = wait_for_status(&scheduler, |s| s.cycles_finished() == 1).await;
    assert!(matches!(status.last_outcome, Some(CycleOutcome::Suspended(_))));
    assert_eq!(store.snapshot().last_sync, Some(at(10, 1, 0)));
    assert!(!daemon.is_finished());

    uploader.set_gated(false);
    signals.send(HostSignal::Unlock).unwrap();
    let status = wait_for_status(&scheduler, |s| s.cycles_finished() == 2).await;
    assert!(matches!(status.last_outcome, Some(CycleOutcome::Completed(_))));
    assert_eq!(store.snapshot().last_sync, Some(at(10, 4, 0)));

    signals.send(HostSignal::Shutdown).unwrap();
    daemon.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_before_the_first_cycle_finishes() {
    let uploader = Arc::new(RecordingUploader::gated());
    let store = Arc::new(MemoryStateStore::with_state(SyncState {
        last_sync: Some(at(10, 0, 0)),
        last_project_id: Some(PROJECT),
    }));
    let scheduler = scheduler(uploader.clone(), store, SchedulerConfig::default());

    let (signals, signal_rx) = mpsc::unbounded_channel();
    signals.send(HostSignal::Shutdown).unwrap();
    supervise(&scheduler, None, signal_rx).await.unwrap();

    scheduler.stop().await.unwrap();
    assert_eq!(scheduler.status().state, SchedulerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn registration_errors_end_the_daemon() {
    let uploader = Arc::new(RecordingUploader::default());
    let scheduler = scheduler(
        uploader,
        Arc::new(MemoryStateStore::new()),
        SchedulerConfig::default(),
    );

    let (_signals, signal_rx) = mpsc::unbounded_channel();
    let err = supervise(&scheduler, None, signal_rx).await.unwrap_err();
    assert!(err.to_string().contains("project"), "{err}");
}
