//! Domain models for Rollcall.
//!
//! # Core Concepts
//!
//! ## Definitions
//!
//! - [`SessionTemplate`]: A reusable week of training, made of [`SessionBlueprint`]s.
//!   Editing a template only affects weeks materialized afterwards.
//!
//! ## Materialized Entities
//!
//! - [`SessionSchedule`]: One template expanded for one week. At most one exists per
//!   `(template, week)` pair.
//! - [`SessionInstance`]: A concrete, dated occurrence of a blueprint. Its roster is a
//!   snapshot taken at materialization time, and it is frozen once attendance exists.
//!
//! ## Ledger Entities
//!
//! - [`AttendanceRecord`]: One athlete's status for one instance on one date. Upserted,
//!   never removed.
//! - [`SessionFeedback`]: Coach feedback for an instance, surfaced per athlete through
//!   the [`TrainingLogEntry`] view. [`FeedbackTemplate`]s seed it with reusable content.
//!
//! ## Derived
//!
//! - [`AttendanceStats`]: Computed on read from the ledger, never persisted.

mod actor;
mod attendance;
mod feedback;
mod schedule;
mod stats;
mod template;

pub use actor::*;
pub use attendance::*;
pub use feedback::*;
pub use schedule::*;
pub use stats::*;
pub use template::*;

/// Athletes are owned by an external directory; only their ids pass through here.
pub type AthleteId = String;
