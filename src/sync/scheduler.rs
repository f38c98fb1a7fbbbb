use std::future::pending;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::models::ProjectId;

use super::collaborators::SyncDeps;
use super::cycle::{run_cycle, CycleContext};
use super::state::{
    CycleOutcome, CycleReport, SchedulerConfig, SchedulerState, SyncEvent, SyncStatus,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const EVENT_CAPACITY: usize = 64;

enum Command {
    Start {
        project_id: Option<ProjectId>,
        ack: oneshot::Sender<Result<()>>,
        first_outcome: Option<oneshot::Sender<CycleOutcome>>,
    },
    Stop {
        ack: oneshot::Sender<()>,
    },
    LockState(bool),
    SyncNow,
    GrantExpired,
}

/// Handle to the background sync loop.
///
/// Cloning is cheap; the loop keeps running until `stop` is called and shuts
/// down once every handle is dropped.
#[derive(Clone)]
pub struct SyncScheduler {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SyncStatus>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncScheduler {
    /// Spawns the scheduler task on the current tokio runtime. Starts `Idle`.
    pub fn spawn(deps: SyncDeps, config: SchedulerConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SyncStatus::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = SchedulerActor {
            deps,
            config,
            commands: command_rx,
            status: status_tx,
            events: events_tx.clone(),
            running: false,
            locked: false,
            project_id: None,
            next_tick: None,
            in_flight: None,
            resume_on_finish: false,
            first_outcome: None,
        };
        tokio::spawn(actor.run());

        Self {
            commands: command_tx,
            status: status_rx,
            events: events_tx,
        }
    }

    /// `Idle → Syncing`. Uses the stored project when `project_id` is `None`.
    pub async fn start(&self, project_id: Option<ProjectId>) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Start {
            project_id,
            ack: ack_tx,
            first_outcome: None,
        })?;
        ack_rx.await.map_err(|_| SyncError::SchedulerGone)?
    }

    /// Starts the loop and waits for the first cycle's outcome, the only one
    /// a foreground caller gets to see.
    pub async fn register(&self, project_id: Option<ProjectId>) -> Result<CycleOutcome> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        self.send(Command::Start {
            project_id,
            ack: ack_tx,
            first_outcome: Some(outcome_tx),
        })?;
        ack_rx.await.map_err(|_| SyncError::SchedulerGone)??;
        outcome_rx.await.map_err(|_| SyncError::Stopped)
    }

    /// Any state `→ Idle`. Aborts an in-flight cycle and releases its grant.
    pub async fn stop(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Stop { ack: ack_tx })?;
        ack_rx.await.map_err(|_| SyncError::SchedulerGone)
    }

    /// Host lock/unlock notification. Safe to call from any thread.
    pub fn notify_lock_state(&self, locked: bool) -> Result<()> {
        self.send(Command::LockState(locked))
    }

    /// Skips the remaining wait when armed.
    pub fn sync_now(&self) -> Result<()> {
        self.send(Command::SyncNow)
    }

    /// Host forced-expiry callback for the current execution grant.
    pub fn grant_expired(&self) -> Result<()> {
        self.send(Command::GrantExpired)
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::SchedulerGone)
    }
}

struct InFlightCycle {
    cycle_id: Uuid,
    report: CycleReport,
    handle: JoinHandle<CycleOutcome>,
    lock_token: CancellationToken,
    expired: bool,
}

enum Wake {
    Command(Option<Command>),
    CycleFinished(std::result::Result<CycleOutcome, JoinError>),
    TimerFired,
}

struct SchedulerActor {
    deps: SyncDeps,
    config: SchedulerConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<SyncStatus>,
    events: broadcast::Sender<SyncEvent>,
    running: bool,
    locked: bool,
    project_id: Option<ProjectId>,
    next_tick: Option<Instant>,
    in_flight: Option<InFlightCycle>,
    /// Unlock arrived while a lock-interrupted cycle was still finishing.
    resume_on_finish: bool,
    first_outcome: Option<oneshot::Sender<CycleOutcome>>,
}

impl SchedulerActor {
    async fn run(mut self) {
        loop {
            // A locked device never has an armed deadline, but be explicit.
            let deadline = if self.locked { None } else { self.next_tick };

            // Commands win ties so a lock always lands before a due tick.
            let wake = tokio::select! {
                biased;
                command = self.commands.recv() => Wake::Command(command),
                joined = wait_for_cycle(self.in_flight.as_mut()) => Wake::CycleFinished(joined),
                _ = wait_until(deadline) => Wake::TimerFired,
            };

            match wake {
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Command(None) => {
                    self.halt();
                    log_info!("sync scheduler shutting down");
                    break;
                }
                Wake::CycleFinished(joined) => self.finish_cycle(joined),
                Wake::TimerFired => {
                    self.next_tick = None;
                    self.begin_cycle();
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                project_id,
                ack,
                first_outcome,
            } => {
                let result = self.start(project_id, first_outcome).await;
                let _ = ack.send(result);
            }
            Command::Stop { ack } => {
                self.halt();
                let _ = ack.send(());
            }
            Command::LockState(locked) => self.set_locked(locked),
            Command::SyncNow => {
                if self.running && !self.locked && self.in_flight.is_none() {
                    self.next_tick = None;
                    self.begin_cycle();
                }
            }
            Command::GrantExpired => {
                if let Some(cycle) = self.in_flight.as_mut() {
                    log_warn!("execution grant expired; abandoning cycle {}", cycle.cycle_id);
                    cycle.expired = true;
                    cycle.handle.abort();
                }
            }
        }
    }

    async fn start(
        &mut self,
        project_id: Option<ProjectId>,
        first_outcome: Option<oneshot::Sender<CycleOutcome>>,
    ) -> Result<()> {
        if self.running {
            return Err(SyncError::AlreadyRunning);
        }

        let project_id = match project_id {
            Some(id) => id,
            None => self.stored_project().await?.ok_or(SyncError::NoProject)?,
        };

        log_info!("sync scheduler starting for project {project_id}");
        self.running = true;
        self.project_id = Some(project_id);
        self.first_outcome = first_outcome;
        self.status.send_modify(|status| status.project_id = Some(project_id));

        if self.locked {
            self.set_state(SchedulerState::Suspended);
        } else {
            self.begin_cycle();
        }
        Ok(())
    }

    async fn stored_project(&self) -> Result<Option<ProjectId>> {
        self.deps
            .store
            .get()
            .await
            .map(|state| state.last_project_id)
            .map_err(SyncError::persist)
    }

    fn halt(&mut self) {
        self.running = false;
        self.next_tick = None;
        self.resume_on_finish = false;
        self.first_outcome = None;

        if let Some(cycle) = self.in_flight.take() {
            log_info!("stopping in-flight cycle {}", cycle.cycle_id);
            cycle.lock_token.cancel();
            // Dropping the cycle future releases its execution grant.
            cycle.handle.abort();
        }

        self.set_state(SchedulerState::Idle);
    }

    fn set_locked(&mut self, locked: bool) {
        if self.locked == locked {
            return;
        }
        self.locked = locked;
        self.status.send_modify(|status| status.locked = locked);
        let _ = self.events.send(SyncEvent::LockChanged(locked));

        if locked {
            self.next_tick = None;
            self.resume_on_finish = false;
            if let Some(cycle) = &self.in_flight {
                cycle.lock_token.cancel();
            }
            if self.running {
                log_info!("device locked; sync suspended");
                self.set_state(SchedulerState::Suspended);
            }
            return;
        }

        if !self.running {
            return;
        }

        log_info!("device unlocked; catching up");
        if self.in_flight.is_some() {
            self.resume_on_finish = true;
        } else {
            self.next_tick = None;
            self.begin_cycle();
        }
    }

    fn begin_cycle(&mut self) {
        if !self.running || self.locked || self.in_flight.is_some() {
            return;
        }
        let Some(project_id) = self.project_id else {
            return;
        };

        let cycle_id = Uuid::new_v4();
        let lock_token = CancellationToken::new();
        let ctx = CycleContext {
            cycle_id,
            project_id,
            deps: self.deps.clone(),
            config: self.config.clone(),
            lock_token: lock_token.clone(),
            events: self.events.clone(),
        };

        let handle = tokio::spawn(run_cycle(ctx));
        self.in_flight = Some(InFlightCycle {
            cycle_id,
            report: CycleReport::new(cycle_id, project_id, self.deps.clock.now()),
            handle,
            lock_token,
            expired: false,
        });

        self.status.send_modify(|status| {
            status.cycles_started += 1;
            status.next_tick_at = None;
        });
        let _ = self.events.send(SyncEvent::CycleStarted {
            cycle_id,
            project_id,
        });
        self.set_state(SchedulerState::Syncing);
    }

    fn finish_cycle(&mut self, joined: std::result::Result<CycleOutcome, JoinError>) {
        let Some(cycle) = self.in_flight.take() else {
            return;
        };

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(err) => {
                let error = if cycle.expired {
                    SyncError::GrantExpired
                } else {
                    SyncError::Internal(format!("sync cycle task failed: {err}"))
                };
                let mut report = cycle.report;
                report.finished_at = Some(self.deps.clock.now());
                CycleOutcome::Failed { error, report }
            }
        };

        self.status.send_modify(|status| {
            if outcome.is_failure() {
                status.cycles_failed += 1;
            } else {
                status.cycles_ok += 1;
            }
            status.last_outcome = Some(outcome.clone());
        });
        let _ = self.events.send(SyncEvent::CycleFinished(outcome.clone()));

        if let Some(reply) = self.first_outcome.take() {
            let _ = reply.send(outcome);
        }

        if !self.running {
            self.set_state(SchedulerState::Idle);
        } else if self.locked {
            self.set_state(SchedulerState::Suspended);
        } else if std::mem::take(&mut self.resume_on_finish) {
            self.begin_cycle();
        } else {
            self.arm();
        }
    }

    fn arm(&mut self) {
        let delay = self.config.tick_interval;
        self.next_tick = Some(Instant::now() + delay);

        let next_tick_at = chrono::Duration::from_std(delay)
            .ok()
            .map(|delay| self.deps.clock.now() + delay);
        self.status
            .send_modify(|status| status.next_tick_at = next_tick_at);
        self.set_state(SchedulerState::ArmedWaiting);
    }

    fn set_state(&mut self, state: SchedulerState) {
        let changed = self.status.send_if_modified(|status| {
            if status.state == state {
                return false;
            }
            status.state = state;
            if state != SchedulerState::ArmedWaiting {
                status.next_tick_at = None;
            }
            true
        });

        if changed {
            log::debug!(
                "sync scheduler -> {} at {}",
                state.as_str(),
                self.deps.clock.now()
            );
            let _ = self.events.send(SyncEvent::StateChanged(state));
        }
    }
}

async fn wait_for_cycle(
    cycle: Option<&mut InFlightCycle>,
) -> std::result::Result<CycleOutcome, JoinError> {
    match cycle {
        Some(cycle) => (&mut cycle.handle).await,
        None => pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => pending().await,
    }
}
