//! Async escape monitor.
//!
//! Owns an [`EscapeHatch`] on its own tokio task, independent of the
//! session timer. Hold signals arrive over a channel, availability over a
//! `watch` channel published by the session runtime.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::EscapeHatch;
use crate::policy::{Mode, Phase};

/// Raw input from the key listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldSignal {
    Start,
    End,
}

/// Availability gate published by the session runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapeGate {
    pub mode: Mode,
    pub phase: Phase,
    /// Bumped on every phase change.
    pub epoch: u64,
    pub available: bool,
}

/// Confirmed hold, tagged with the gate epoch it was armed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapeRequest {
    pub epoch: u64,
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Spawn the monitor. It ends when the hold channel or gate closes, or
/// when `on_confirm` returns `false`.
pub fn spawn_escape_monitor<F>(
    mut hatch: EscapeHatch,
    mut gate: watch::Receiver<EscapeGate>,
    mut holds: mpsc::UnboundedReceiver<HoldSignal>,
    on_confirm: F,
) -> JoinHandle<()>
where
    F: Fn(EscapeRequest) -> bool + Send + 'static,
{
    tokio::spawn(async move {
        let mut armed_epoch = gate.borrow().epoch;
        loop {
            let deadline = hatch.deadline().map(Instant::from_std);
            tokio::select! {
                signal = holds.recv() => match signal {
                    Some(HoldSignal::Start) => {
                        let current = *gate.borrow_and_update();
                        if hatch.on_key_hold_start(now(), current.available) {
                            armed_epoch = current.epoch;
                            tracing::debug!(
                                mode = %current.mode,
                                phase = %current.phase,
                                epoch = current.epoch,
                                "escape hold armed"
                            );
                        }
                    }
                    Some(HoldSignal::End) => {
                        if hatch.on_key_hold_end(now()) {
                            tracing::debug!("escape hold released early");
                        }
                    }
                    None => return,
                },
                changed = gate.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let current = *gate.borrow_and_update();
                    if (!current.available || current.epoch != armed_epoch) && hatch.disarm() {
                        tracing::debug!(phase = %current.phase, "escape hold cancelled by phase change");
                    }
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if hatch.poll(now()) {
                        tracing::info!(epoch = armed_epoch, "escape hatch confirmed");
                        if !on_confirm(EscapeRequest { epoch: armed_epoch }) {
                            return;
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn gate(phase: Phase, epoch: u64, available: bool) -> EscapeGate {
        EscapeGate {
            mode: Mode::Strict,
            phase,
            epoch,
            available,
        }
    }

    struct Harness {
        gate: watch::Sender<EscapeGate>,
        holds: mpsc::UnboundedSender<HoldSignal>,
        requests: mpsc::UnboundedReceiver<EscapeRequest>,
        _task: JoinHandle<()>,
    }

    fn harness(initial: EscapeGate) -> Harness {
        let (gate_tx, gate_rx) = watch::channel(initial);
        let (hold_tx, hold_rx) = mpsc::unbounded_channel();
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let task = spawn_escape_monitor(EscapeHatch::default(), gate_rx, hold_rx, move |r| {
            req_tx.send(r).is_ok()
        });
        Harness {
            gate: gate_tx,
            holds: hold_tx,
            requests: req_rx,
            _task: task,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_hold_emits_one_request() {
        let mut h = harness(gate(Phase::BreakActive, 4, true));
        h.holds.send(HoldSignal::Start).unwrap();
        let request = h.requests.recv().await.unwrap();
        assert_eq!(request, EscapeRequest { epoch: 4 });
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.requests.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn short_hold_emits_nothing() {
        let mut h = harness(gate(Phase::BreakActive, 1, true));
        h.holds.send(HoldSignal::Start).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        h.holds.send(HoldSignal::End).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.requests.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_gate_ignores_hold() {
        let mut h = harness(gate(Phase::Working, 1, false));
        h.holds.send(HoldSignal::Start).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        // Becoming available later does not resurrect the ignored hold.
        h.gate.send(gate(Phase::BreakActive, 2, true)).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.requests.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn phase_change_mid_hold_cancels() {
        let mut h = harness(gate(Phase::BreakActive, 1, true));
        h.holds.send(HoldSignal::Start).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.gate.send(gate(Phase::Working, 2, false)).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.requests.try_recv().is_err());
    }
}
