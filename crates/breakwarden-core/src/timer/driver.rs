//! Async countdown driver.
//!
//! Runs one [`Countdown`] on its own tokio task and delivers
//! generation-tagged signals to a sink. The receiver compares the
//! generation with the timer it currently owns and drops anything older,
//! so a cancelled timer can never complete a newer phase.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::engine::{Countdown, CountdownSignal};
use crate::error::Result;

/// Signal delivered by a running countdown task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSignal {
    pub generation: u64,
    pub signal: CountdownSignal,
}

/// Driver tuning shared by every countdown of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    pub tick_interval: Duration,
    /// Only applied to countdowns started with `warn = true`.
    pub warning: Option<Duration>,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            warning: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug)]
enum Control {
    Pause,
    Resume,
    Extend(Duration),
    Cancel,
}

/// Owner handle for a spawned countdown. Dropping it stops the task.
#[derive(Debug)]
pub struct TimerHandle {
    generation: u64,
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pause(&self) {
        let _ = self.control.send(Control::Pause);
    }

    pub fn resume(&self) {
        let _ = self.control.send(Control::Resume);
    }

    pub fn extend(&self, by: Duration) {
        let _ = self.control.send(Control::Extend(by));
    }

    pub fn cancel(self) {
        let _ = self.control.send(Control::Cancel);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Spawn a countdown of `duration` on the current runtime.
///
/// `sink` receives every signal and returns `false` once nobody listens,
/// which ends the task.
///
/// # Errors
///
/// Returns `InvalidDuration` if `duration` is zero; nothing is spawned.
pub fn spawn_countdown<F>(
    generation: u64,
    duration: Duration,
    settings: TimerSettings,
    warn: bool,
    sink: F,
) -> Result<TimerHandle>
where
    F: Fn(TimerSignal) -> bool + Send + 'static,
{
    let mut countdown = match settings.warning.filter(|_| warn) {
        Some(threshold) => Countdown::with_warning(threshold),
        None => Countdown::default(),
    };
    countdown.start(duration, now())?;

    let (control, mut control_rx) = mpsc::unbounded_channel();
    let tick_interval = settings.tick_interval.max(Duration::from_millis(1));

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + tick_interval, tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let deadline = countdown.next_deadline().map(Instant::from_std);
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
                ctrl = control_rx.recv() => {
                    match ctrl {
                        Some(Control::Pause) => { countdown.pause(now()); }
                        Some(Control::Resume) => { countdown.resume(now()); }
                        Some(Control::Extend(by)) => { countdown.extend(by, now()); }
                        Some(Control::Cancel) | None => {
                            countdown.cancel();
                            tracing::debug!(generation, "countdown cancelled");
                            return;
                        }
                    }
                    continue;
                }
            }

            let Some(signal) = countdown.tick(now()) else {
                continue;
            };
            if !sink(TimerSignal { generation, signal }) {
                return;
            }
            if signal == CountdownSignal::Completed {
                tracing::debug!(generation, "countdown completed");
                return;
            }
        }
    });

    Ok(TimerHandle {
        generation,
        control,
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> (
        impl Fn(TimerSignal) -> bool + Send + 'static,
        mpsc::UnboundedReceiver<TimerSignal>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (move |s| tx.send(s).is_ok(), rx)
    }

    async fn completion(rx: &mut mpsc::UnboundedReceiver<TimerSignal>) -> TimerSignal {
        loop {
            let s = rx.recv().await.expect("timer channel closed");
            if s.signal == CountdownSignal::Completed {
                return s;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_duration() {
        let (sink, mut rx) = collector();
        let started = Instant::now();
        let _handle = spawn_countdown(7, Duration::from_secs(90), TimerSettings::default(), false, sink)
            .unwrap();
        let done = completion(&mut rx).await;
        assert_eq!(done.generation, 7);
        let waited = Instant::now() - started;
        assert!(waited >= Duration::from_secs(90) && waited < Duration::from_secs(91));
    }

    #[tokio::test(start_paused = true)]
    async fn emits_warning_before_completion() {
        let (sink, mut rx) = collector();
        let settings = TimerSettings {
            tick_interval: Duration::from_secs(30),
            warning: Some(Duration::from_secs(60)),
        };
        let _handle = spawn_countdown(1, Duration::from_secs(300), settings, true, sink).unwrap();
        let mut warnings = 0;
        loop {
            let s = rx.recv().await.unwrap();
            match s.signal {
                CountdownSignal::EndingSoon { .. } => warnings += 1,
                CountdownSignal::Completed => break,
                CountdownSignal::Tick { .. } => {}
            }
        }
        assert_eq!(warnings, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_completion() {
        let (sink, mut rx) = collector();
        let handle = spawn_countdown(3, Duration::from_secs(10), TimerSettings::default(), false, sink)
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(30)).await;
        while let Ok(s) = rx.try_recv() {
            assert_ne!(s.signal, CountdownSignal::Completed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn extend_pushes_completion_back() {
        let (sink, mut rx) = collector();
        let started = Instant::now();
        let handle = spawn_countdown(4, Duration::from_secs(60), TimerSettings::default(), false, sink)
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.extend(Duration::from_secs(300));
        completion(&mut rx).await;
        let waited = Instant::now() - started;
        assert!(waited >= Duration::from_secs(360) && waited < Duration::from_secs(361));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_duration_spawns_nothing() {
        let (sink, _rx) = collector();
        assert!(spawn_countdown(1, Duration::ZERO, TimerSettings::default(), false, sink).is_err());
    }
}
