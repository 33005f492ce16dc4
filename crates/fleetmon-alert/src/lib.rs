//! Alert lifecycle and escalation engine.
//!
//! Three time-driven components cooperate over the shared store:
//!
//! - [`evaluator::RuleEvaluator`] turns incoming fact updates into alert
//!   creation and auto-resolution requests, applying sustained-duration
//!   and cooldown logic per de-duplication key.
//! - [`lifecycle::AlertLifecycleManager`] owns the alert state machine:
//!   de-duplication, maintenance-window suppression, flap damping,
//!   grouping, and the acknowledge/resolve/suppress/expire operations.
//! - [`escalation::EscalationScheduler`] advances active, unacknowledged
//!   alerts through their policy's timed steps and hands each fire to the
//!   notification dispatcher.
//!
//! None of the components keeps authoritative state in memory: progress is
//! derived from persisted fields on every tick, so any of them can be
//! restarted (or run concurrently with a peer) without re-sending work.

pub mod error;
pub mod escalation;
pub mod evaluator;
pub mod lifecycle;

#[cfg(test)]
mod tests;

pub use error::{AlertError, Result};
pub use escalation::EscalationScheduler;
pub use evaluator::{FactUpdate, RuleEvaluator};
pub use lifecycle::{AlertLifecycleManager, TriggerOutcome};
