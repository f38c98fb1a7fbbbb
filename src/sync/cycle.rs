use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::{GeoFix, MeasurementSnapshot, ProjectContext, ProjectId, SyncBatch};

use super::collaborators::{LocationProvider, SyncDeps};
use super::grant::GrantGuard;
use super::planner::plan_backfill;
use super::state::{CycleOutcome, CycleReport, SchedulerConfig, SyncEvent};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub(crate) struct CycleContext {
    pub cycle_id: Uuid,
    pub project_id: ProjectId,
    pub deps: SyncDeps,
    pub config: SchedulerConfig,
    /// Cancelled when the device locks. Stops collection and any further
    /// batch; an upload already in flight is left to finish.
    pub lock_token: CancellationToken,
    pub events: broadcast::Sender<SyncEvent>,
}

enum Progress {
    Done,
    NothingPlanned,
    Interrupted,
}

pub(crate) async fn run_cycle(ctx: CycleContext) -> CycleOutcome {
    let started = Instant::now();
    let mut report = CycleReport::new(ctx.cycle_id, ctx.project_id, ctx.deps.clock.now());
    let grant = GrantGuard::acquire(ctx.deps.grants.clone());

    let result = match grant.budget() {
        Some(budget) => match time::timeout(budget, execute(&ctx, &mut report)).await {
            Ok(result) => result,
            Err(_) => {
                log_warn!(
                    "cycle {} abandoned: execution grant of {}s expired",
                    ctx.cycle_id,
                    budget.as_secs()
                );
                Err(SyncError::GrantExpired)
            }
        },
        None => execute(&ctx, &mut report).await,
    };

    grant.release();
    report.finished_at = Some(ctx.deps.clock.now());

    let outcome = match result {
        Ok(Progress::Done) => CycleOutcome::Completed(report),
        Ok(Progress::NothingPlanned) => CycleOutcome::NothingToSync(report),
        Ok(Progress::Interrupted) => CycleOutcome::Suspended(report),
        Err(error) => CycleOutcome::Failed { error, report },
    };

    match &outcome {
        CycleOutcome::Failed { error, report } => log_error!(
            "sync cycle {} failed after {} batches ({}ms): {error}",
            ctx.cycle_id,
            report.batches,
            started.elapsed().as_millis()
        ),
        other => {
            let report = other.report();
            log_info!(
                "sync cycle {} {}: planned={}, uploaded={}, batches={}, took {}ms",
                ctx.cycle_id,
                other.as_str(),
                report.planned,
                report.uploaded,
                report.batches,
                started.elapsed().as_millis()
            );
        }
    }

    outcome
}

async fn execute(ctx: &CycleContext, report: &mut CycleReport) -> Result<Progress, SyncError> {
    if ctx.lock_token.is_cancelled() {
        return Ok(Progress::Interrupted);
    }

    let profile = ctx
        .deps
        .source
        .user_profile()
        .await
        .map_err(SyncError::context)?;
    let context = ProjectContext::new(ctx.project_id, profile);

    let fix = match ctx.deps.location.as_deref() {
        Some(provider) => tokio::select! {
            biased;
            _ = ctx.lock_token.cancelled() => return Ok(Progress::Interrupted),
            fix = wait_for_fix(provider, ctx) => fix,
        },
        None => None,
    };

    let state = ctx.deps.store.get().await.map_err(SyncError::persist)?;
    let now = ctx.deps.clock.now();
    let plan = plan_backfill(state.last_sync, now);
    report.planned = plan.len();

    let Some(&live_timestamp) = plan.last() else {
        return Ok(Progress::NothingPlanned);
    };

    if plan.len() > 1 {
        log_info!(
            "backfilling {} snapshots since {:?}",
            plan.len(),
            state.last_sync
        );
    }

    for chunk in plan.chunks(ctx.config.max_batch_size.max(1)) {
        let mut snapshots = Vec::with_capacity(chunk.len());
        for &timestamp in chunk {
            let snapshot = tokio::select! {
                biased;
                _ = ctx.lock_token.cancelled() => return Ok(Progress::Interrupted),
                snapshot = collect_snapshot(ctx, timestamp) => snapshot,
            };
            snapshots.push(snapshot);
        }

        if let (Some(fix), Some(last)) = (fix, snapshots.last_mut()) {
            if last.timestamp == live_timestamp && !last.has_location() {
                last.set_location(fix.latitude, fix.longitude);
            }
        }

        if ctx.lock_token.is_cancelled() {
            return Ok(Progress::Interrupted);
        }

        let batch = SyncBatch::new(context.clone(), snapshots)?;
        ctx.deps
            .uploader
            .send(&batch)
            .await
            .map_err(SyncError::upload)?;

        let watermark = batch.last_timestamp();
        ctx.deps
            .store
            .set(watermark, ctx.project_id)
            .await
            .map_err(SyncError::persist)?;

        report.record_batch(batch.len(), watermark);
        let _ = ctx.events.send(SyncEvent::BatchUploaded {
            cycle_id: ctx.cycle_id,
            size: batch.len(),
            watermark,
        });
    }

    if ctx.lock_token.is_cancelled() && report.uploaded < report.planned {
        return Ok(Progress::Interrupted);
    }

    Ok(Progress::Done)
}

async fn collect_snapshot(ctx: &CycleContext, timestamp: DateTime<Utc>) -> MeasurementSnapshot {
    match time::timeout(ctx.config.source_timeout, ctx.deps.source.snapshot(timestamp)).await {
        Ok(Ok(mut snapshot)) => {
            // Rows are keyed by the planned minute, whatever the source stamped.
            snapshot.timestamp = timestamp;
            snapshot
        }
        Ok(Err(err)) => {
            log_warn!("measurement source failed at {timestamp}: {err:#}");
            MeasurementSnapshot::empty(timestamp)
        }
        Err(_) => {
            log_warn!(
                "measurement source timed out (> {}s) at {timestamp}",
                ctx.config.source_timeout.as_secs()
            );
            MeasurementSnapshot::empty(timestamp)
        }
    }
}

async fn wait_for_fix(provider: &dyn LocationProvider, ctx: &CycleContext) -> Option<GeoFix> {
    let max_age = chrono::Duration::from_std(ctx.config.location_max_age)
        .unwrap_or_else(|_| chrono::Duration::seconds(120));

    provider.request_fix().await;

    for attempt in 1..=ctx.config.location_fix_attempts {
        if let Some(fix) = provider.last_fix().await {
            if fix.is_fresh(ctx.deps.clock.now(), max_age) {
                return Some(fix);
            }
        }
        if attempt < ctx.config.location_fix_attempts {
            time::sleep(ctx.config.location_poll_interval).await;
        }
    }

    log_warn!(
        "no fresh location fix after {} attempts",
        ctx.config.location_fix_attempts
    );
    None
}
