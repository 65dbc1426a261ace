//! Session lifecycle: records, the state machine and its async runtime.

mod collaborators;
mod manager;
mod model;
mod runtime;

pub use collaborators::{ChannelNotifier, Collaborators, DeviceControl, Notifier, SessionStore};
pub use manager::{Directive, SessionManager, UserAction};
pub use model::{quality_score, BreakOutcome, RealizedBreak, Session, Task};
pub use runtime::{RuntimeSettings, SessionHandle, SessionInput, SessionRuntime};
