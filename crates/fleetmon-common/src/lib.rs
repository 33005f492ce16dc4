//! Shared domain types for the fleetmon alert engine.
//!
//! Alerts, rules, escalation policies, notification channels, maintenance
//! windows, and global settings live here, together with the wire-string
//! mappings used by storage backends and the quiet-hours evaluator.

pub mod id;
pub mod quiet;
pub mod types;
