//! Cycle journal: records every finished sync cycle to the `sync_cycles`
//! table so failures can be diagnosed after the fact.

use chrono::Utc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::db::{Database, SyncCycleRecord};
use crate::sync::SyncEvent;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Runs until `cancel_token` fires or the scheduler's event channel closes.
/// Subscribe before starting the scheduler or the first cycle is missed.
pub async fn journal_loop(
    mut events: broadcast::Receiver<SyncEvent>,
    db: Database,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            received = events.recv() => {
                match received {
                    Ok(SyncEvent::CycleFinished(outcome)) => {
                        let cycle_id = outcome.report().cycle_id;
                        let record = SyncCycleRecord::from_outcome(&outcome, Utc::now());
                        if let Err(err) = db.insert_sync_cycle(&record).await {
                            log_error!("failed to journal cycle {cycle_id}: {err:#}");
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        log_warn!("cycle journal lagged, {skipped} events dropped");
                    }
                    Err(RecvError::Closed) => {
                        log_info!("scheduler gone, cycle journal stopping");
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("cycle journal shutting down");
                break;
            }
        }
    }
}
