//! Foreground side of `healthsync run`: turns host signals into scheduler
//! notifications for as long as the daemon lives, first cycle included.

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::ProjectId;
use crate::sync::{CycleOutcome, SyncScheduler};

/// Host notification relayed to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    Lock,
    Unlock,
    Shutdown,
}

/// Installs the process signal handlers and forwards them to `signals`:
/// SIGUSR1 locks, SIGUSR2 unlocks, Ctrl-C shuts down.
///
/// Handlers are registered before this returns, so a signal that arrives
/// afterwards can no longer take the default (fatal) action.
#[cfg(unix)]
pub fn listen_for_host_signals(
    signals: mpsc::UnboundedSender<HostSignal>,
) -> Result<JoinHandle<()>> {
    use anyhow::Context;
    use tokio::signal::unix::{signal, SignalKind};

    let mut lock = signal(SignalKind::user_defined1()).context("failed to install SIGUSR1")?;
    let mut unlock = signal(SignalKind::user_defined2()).context("failed to install SIGUSR2")?;
    let mut interrupt = signal(SignalKind::interrupt()).context("failed to install SIGINT")?;

    Ok(tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                Some(()) = lock.recv() => HostSignal::Lock,
                Some(()) = unlock.recv() => HostSignal::Unlock,
                _ = interrupt.recv() => HostSignal::Shutdown,
            };
            if signals.send(next).is_err() {
                break;
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn listen_for_host_signals(
    signals: mpsc::UnboundedSender<HostSignal>,
) -> Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = signals.send(HostSignal::Shutdown);
            }
            Err(err) => log::error!("failed to listen for ctrl-c: {err}"),
        }
    }))
}

/// Registers the scheduler and relays `signals` to it until a shutdown
/// arrives or every sender is gone. Lock changes reach the scheduler while
/// the first cycle is still running.
pub async fn supervise(
    scheduler: &SyncScheduler,
    project: Option<ProjectId>,
    mut signals: mpsc::UnboundedReceiver<HostSignal>,
) -> Result<()> {
    let registration = scheduler.register(project);
    tokio::pin!(registration);
    let mut registered = false;

    loop {
        tokio::select! {
            outcome = &mut registration, if !registered => {
                registered = true;
                log_first_outcome(&outcome?);
            }
            signal = signals.recv() => match signal {
                Some(HostSignal::Lock) => {
                    log::info!("lock signal received");
                    scheduler.notify_lock_state(true)?;
                }
                Some(HostSignal::Unlock) => {
                    log::info!("unlock signal received");
                    scheduler.notify_lock_state(false)?;
                }
                Some(HostSignal::Shutdown) | None => return Ok(()),
            },
        }
    }
}

fn log_first_outcome(outcome: &CycleOutcome) {
    let report = outcome.report();
    match outcome.error() {
        Some(err) => log::error!("initial sync failed: {err}"),
        None => log::info!(
            "initial sync {}: {} of {} snapshots uploaded",
            outcome.as_str(),
            report.uploaded,
            report.planned
        ),
    }
}
