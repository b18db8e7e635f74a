//! Active workout session lifecycle.

mod controller;
mod state;

pub use controller::{EndOutcome, SessionEvent, SessionSnapshot, WorkoutSessionController};
pub use state::{RestTimer, SessionPhase, SessionState};
