//! Async session runtime.
//!
//! One tokio task owns the [`SessionManager`] and consumes a single queue
//! of inputs: countdown signals, user actions, escape requests and cancel.
//! Inputs are applied in receive order. Collaborator calls are handed to a
//! dedicated dispatcher thread so a slow store or device never delays a
//! transition.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::collaborators::Collaborators;
use super::manager::{Directive, SessionManager, UserAction};
use super::model::{Session, Task};
use crate::error::{CoreError, Result};
use crate::escape::{spawn_escape_monitor, EscapeGate, EscapeHatch, EscapeRequest, HoldSignal};
use crate::events::Event;
use crate::policy::{Mode, ModePolicy, Phase};
use crate::storage::Config;
use crate::streak::{RecordOutcome, SharedStreaks};
use crate::timer::{spawn_countdown, TimerHandle, TimerSettings, TimerSignal};

/// Everything the owner task reacts to.
#[derive(Debug)]
pub enum SessionInput {
    Timer(TimerSignal),
    Action {
        action: UserAction,
        reply: oneshot::Sender<Result<()>>,
    },
    Escape(EscapeRequest),
    Cancel {
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<Session>,
    },
}

/// Runtime tuning.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub timer: TimerSettings,
    /// `None` disables the escape hatch entirely.
    pub escape: Option<EscapeHatch>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            timer: TimerSettings::default(),
            escape: Some(EscapeHatch::default()),
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &Config) -> Self {
        let warning = Duration::from_secs(config.timer.break_warning_secs);
        Self {
            timer: TimerSettings {
                tick_interval: Duration::from_millis(config.timer.tick_interval_ms),
                warning: (!warning.is_zero()).then_some(warning),
            },
            escape: config
                .escape_hatch
                .enabled
                .then(|| EscapeHatch::from_config(&config.escape_hatch)),
        }
    }
}

enum Outbound {
    Event(Event),
    Effects { mode: Mode, phase: Phase },
    Finalize(Box<Session>),
}

/// Client side of a running session.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    inputs: mpsc::UnboundedSender<SessionInput>,
    holds: Option<mpsc::UnboundedSender<HoldSignal>>,
    gate: watch::Receiver<EscapeGate>,
    task: JoinHandle<Session>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest published phase gate.
    pub fn gate(&self) -> EscapeGate {
        *self.gate.borrow()
    }

    /// Receiver notified on every phase change.
    pub fn watch_gate(&self) -> watch::Receiver<EscapeGate> {
        self.gate.clone()
    }

    /// Submit a user action and wait for the verdict.
    ///
    /// # Errors
    ///
    /// Returns the manager's rejection, or `SessionClosed` if the session
    /// finished before the action was applied.
    pub async fn act(&self, action: UserAction) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionInput::Action { action, reply })?;
        rx.await.map_err(|_| CoreError::SessionClosed(self.id))?
    }

    pub async fn take_break(&self) -> Result<()> {
        self.act(UserAction::TakeBreak).await
    }

    pub async fn snooze(&self) -> Result<()> {
        self.act(UserAction::Snooze).await
    }

    pub async fn skip(&self) -> Result<()> {
        self.act(UserAction::Skip).await
    }

    pub async fn extend(&self, by: Duration) -> Result<()> {
        self.act(UserAction::Extend(by)).await
    }

    /// Escape keys pressed. Ignored when the hatch is disabled.
    pub fn hold_start(&self) {
        if let Some(holds) = &self.holds {
            let _ = holds.send(HoldSignal::Start);
        }
    }

    /// Escape keys released.
    pub fn hold_end(&self) {
        if let Some(holds) = &self.holds {
            let _ = holds.send(HoldSignal::End);
        }
    }

    /// # Errors
    ///
    /// Returns `SessionClosed` if the session already finished.
    pub async fn cancel(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionInput::Cancel { reply })?;
        rx.await.map_err(|_| CoreError::SessionClosed(self.id))?
    }

    /// # Errors
    ///
    /// Returns `SessionClosed` if the session already finished.
    pub async fn snapshot(&self) -> Result<Session> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionInput::Snapshot { reply })?;
        rx.await.map_err(|_| CoreError::SessionClosed(self.id))
    }

    /// Wait until the session is terminal and every collaborator call has
    /// been made.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the owner task was aborted.
    pub async fn finished(self) -> Result<Session> {
        let id = self.id;
        self.task.await.map_err(|_| CoreError::SessionClosed(id))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    fn send(&self, input: SessionInput) -> Result<()> {
        self.inputs
            .send(input)
            .map_err(|_| CoreError::SessionClosed(self.id))
    }
}

/// Owner-side state of a running session.
struct Owner {
    manager: SessionManager,
    timer: Option<TimerHandle>,
    settings: TimerSettings,
    inputs: mpsc::UnboundedSender<SessionInput>,
    gate: watch::Sender<EscapeGate>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Owner {
    fn execute(&mut self, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::Notify(event) => self.emit(Outbound::Event(event)),
                Directive::StartTimer {
                    generation,
                    duration,
                    warn,
                } => {
                    let inputs = self.inputs.clone();
                    let sink = move |s| inputs.send(SessionInput::Timer(s)).is_ok();
                    // Replacing the handle aborts the previous countdown.
                    match spawn_countdown(generation, duration, self.settings, warn, sink) {
                        Ok(handle) => self.timer = Some(handle),
                        Err(e) => {
                            tracing::error!(error = %e, "failed to start countdown");
                            self.timer = None;
                        }
                    }
                }
                Directive::ExtendTimer { generation, by } => {
                    if let Some(timer) = self.timer.as_ref().filter(|t| t.generation() == generation) {
                        timer.extend(by);
                    }
                }
                Directive::CancelTimer => {
                    if let Some(timer) = self.timer.take() {
                        timer.cancel();
                    }
                }
                Directive::PhaseEffects { mode, phase } => {
                    self.emit(Outbound::Effects { mode, phase });
                }
                Directive::Finalize(session) => self.emit(Outbound::Finalize(session)),
            }
        }
        let gate = self.manager.gate();
        self.gate.send_if_modified(|current| {
            if *current == gate {
                return false;
            }
            *current = gate;
            true
        });
    }

    fn emit(&self, outbound: Outbound) {
        if self.outbound.send(outbound).is_err() {
            tracing::warn!("dispatcher gone; dropping outbound call");
        }
    }

    /// Turn a result into directives, reporting rejections as diagnostics.
    fn apply(&mut self, result: Result<Vec<Directive>>) -> Result<()> {
        match result {
            Ok(directives) => {
                self.execute(directives);
                Ok(())
            }
            Err(err) => {
                match &err {
                    CoreError::StaleEvent { .. } => tracing::warn!(error = %err, "dropping stale event"),
                    _ => tracing::warn!(error = %err, "input rejected"),
                }
                let now = Utc::now();
                let diagnostic = self.manager.diagnostic(&err, now);
                self.execute(vec![diagnostic]);
                Err(err)
            }
        }
    }

    fn handle(&mut self, input: SessionInput) {
        let now = Utc::now();
        match input {
            SessionInput::Timer(signal) => {
                let result = self.manager.on_timer(signal, now);
                // Stale ticks are routine after a phase change; only log them.
                if let Err(err @ CoreError::StaleEvent { .. }) = &result {
                    if !matches!(signal.signal, crate::timer::CountdownSignal::Completed) {
                        tracing::debug!(error = %err, "dropping stale tick");
                        return;
                    }
                }
                let _ = self.apply(result);
            }
            SessionInput::Action { action, reply } => {
                let result = self.manager.act(action, now);
                let _ = reply.send(self.apply(result));
            }
            SessionInput::Escape(request) => {
                let result = self.manager.emergency_exit(request.epoch, now);
                let _ = self.apply(result);
            }
            SessionInput::Cancel { reply } => {
                let result = self.manager.cancel(now);
                let _ = reply.send(self.apply(result));
            }
            SessionInput::Snapshot { reply } => {
                let _ = reply.send(self.manager.session().clone());
            }
        }
    }
}

fn dispatch(
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    collaborators: Collaborators,
    streaks: Arc<SharedStreaks>,
) {
    while let Some(call) = outbound.blocking_recv() {
        match call {
            Outbound::Event(event) => collaborators.notifier.notify(&event),
            Outbound::Effects { mode, phase } => {
                if let Err(e) = collaborators.device.apply_phase_effects(mode, phase) {
                    tracing::warn!(error = %e, %mode, %phase, "device control failed");
                }
            }
            Outbound::Finalize(session) => {
                if let Err(e) = collaborators.store.save_session(&session) {
                    tracing::warn!(error = %e, session = %session.id, "failed to persist session");
                }
                let (outcome, snapshot) = streaks.record(&session);
                if let Err(e) = collaborators.store.save_streaks(&snapshot) {
                    tracing::warn!(error = %e, "failed to persist streaks");
                }
                if let RecordOutcome::Applied { milestones } = outcome {
                    for milestone in milestones {
                        collaborators.notifier.notify(&Event::StreakMilestone {
                            kind: milestone.kind,
                            count: milestone.count,
                            at: Utc::now(),
                        });
                    }
                }
            }
        }
    }
}

/// Spawns sessions on the current tokio runtime.
pub struct SessionRuntime;

impl SessionRuntime {
    /// Plan `task` and start running it.
    ///
    /// # Errors
    ///
    /// Planning errors are returned synchronously and nothing is spawned.
    pub fn spawn(
        task: Task,
        policy: &ModePolicy,
        streaks: Arc<SharedStreaks>,
        collaborators: Collaborators,
        settings: RuntimeSettings,
    ) -> Result<SessionHandle> {
        let (manager, directives) = SessionManager::start(task, policy, Utc::now())?;
        let id = manager.session().id;

        let (inputs_tx, mut inputs_rx) = mpsc::unbounded_channel();
        let (gate_tx, gate_rx) = watch::channel(manager.gate());
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        // A plain thread rather than the blocking pool: tokio stops
        // auto-advancing paused time while a blocking task is alive.
        let (done_tx, done_rx) = oneshot::channel::<()>();
        std::thread::Builder::new()
            .name(format!("breakwarden-dispatch-{id}"))
            .spawn(move || {
                dispatch(outbound_rx, collaborators, streaks);
                let _ = done_tx.send(());
            })?;

        let holds = settings.escape.map(|hatch| {
            let (holds_tx, holds_rx) = mpsc::unbounded_channel();
            let inputs = inputs_tx.clone();
            spawn_escape_monitor(hatch, gate_rx.clone(), holds_rx, move |request| {
                inputs.send(SessionInput::Escape(request)).is_ok()
            });
            holds_tx
        });

        let mut owner = Owner {
            manager,
            timer: None,
            settings: settings.timer,
            inputs: inputs_tx.clone(),
            gate: gate_tx,
            outbound: outbound_tx,
        };
        owner.execute(directives);

        let task = tokio::spawn(async move {
            while let Some(input) = inputs_rx.recv().await {
                owner.handle(input);
                if owner.manager.is_terminal() {
                    break;
                }
            }
            let Owner {
                manager,
                timer,
                outbound,
                ..
            } = owner;
            drop(timer);
            drop(outbound);
            if done_rx.await.is_err() {
                tracing::error!(session = %id, "dispatcher panicked");
            }
            manager.session().clone()
        });

        Ok(SessionHandle {
            id,
            inputs: inputs_tx,
            holds,
            gate: gate_rx,
            task,
        })
    }
}
