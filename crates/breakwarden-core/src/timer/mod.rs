mod driver;
mod engine;

pub use driver::{spawn_countdown, TimerHandle, TimerSettings, TimerSignal};
pub use engine::{format_clock, Countdown, CountdownSignal, CountdownState};
