//! # Breakwarden Core Library
//!
//! This library provides the session state machine and break scheduler for
//! Breakwarden, a work/break enforcer with three modes (flexible, strict,
//! deep-focus). The CLI binary is a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Scheduler**: Pure planning of work/break intervals
//! - **Policy**: Per-mode table of allowed actions and parameters
//! - **Timer**: A wall-clock countdown plus an async driver task
//! - **Escape hatch**: Sustained key-hold detector for emergency exits
//! - **Session**: Synchronous state machine owned by a single tokio task
//! - **Streaks**: Idempotent streak ledger over finalized sessions
//! - **Storage**: TOML-based configuration
//!
//! ## Key Components
//!
//! - [`SessionManager`]: Session state machine
//! - [`SessionRuntime`]: Async owner of a running session
//! - [`ModePolicy`]: Single source of truth for what each mode allows
//! - [`StreakLedger`]: Streak bookkeeping
//! - [`Config`]: Application configuration management

pub mod error;
pub mod escape;
pub mod events;
pub mod policy;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod streak;
pub mod timer;

pub use error::{ConfigError, CoreError};
pub use escape::{EscapeHatch, KeyCombo};
pub use events::Event;
pub use policy::{Action, ActionSet, Mode, ModeParameters, ModePolicy, Phase};
pub use scheduler::{BreakPlan, ClosingRest, EnergyPattern, Interval, IntervalKind, Strategy};
pub use session::{
    BreakOutcome, Collaborators, SessionHandle, SessionManager, SessionRuntime, Session, Task,
    UserAction,
};
pub use storage::Config;
pub use streak::{SharedStreaks, StreakLedger, StreakState};
pub use timer::{format_clock, Countdown};
