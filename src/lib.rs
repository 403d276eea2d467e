//! Rollcall: recurring training-session scheduling and attendance tracking.
//!
//! A coach describes a week of training once, as a [`models::SessionTemplate`]. Each
//! week the template is *materialized* into concrete, dated
//! [`models::SessionInstance`]s, attendance is recorded against those instances, and
//! per-athlete statistics are derived from the recorded attendance.
//!
//! The crate is layered the same way the data flows:
//!
//! - [`store`]: the keyed-record persistence interface, plus an in-memory backend
//! - [`db`]: the SQLite backend for that interface
//! - [`scheduling`]: template store, materializer, attendance ledger, stats, feedback
//! - [`api`]: the HTTP surface over [`scheduling::Scheduler`]

pub mod api;
pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod roster;
pub mod scheduling;
pub mod store;

pub use error::{Error, Result};
