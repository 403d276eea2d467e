//! Error taxonomy for scheduling and attendance operations.
//!
//! Errors fall into a few families with different handling:
//!
//! - [`ValidationError`]: bad input, rejected before anything is written.
//! - [`ConflictError`]: the write would clobber other state. Carries enough detail for
//!   the caller to retry or choose a different [`ConflictPolicy`](crate::models::ConflictPolicy).
//! - [`IntegrityError`]: stored data is inconsistent. Never papered over.
//! - Lookup failures and storage failures.

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::InstanceField;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("invalid template {template_id}: {reason}")]
    InvalidTemplate { template_id: Uuid, reason: String },

    #[error("unknown session instance {0}")]
    UnknownSessionInstance(Uuid),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("athlete {athlete_id} is not visible to user {user_id}")]
    AthleteNotVisible { athlete_id: String, user_id: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short machine-readable name for the error family.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict(ConflictError::Reconciliation { .. })
            | Self::Conflict(ConflictError::InstanceTaken { .. }) => "reconciliation_conflict",
            Self::Conflict(_) => "concurrent_update_conflict",
            Self::Integrity(_) => "integrity",
            Self::InvalidTemplate { .. } => "invalid_template",
            Self::UnknownSessionInstance(_) => "unknown_session_instance",
            Self::NotFound { .. } => "not_found",
            Self::AthleteNotVisible { .. } => "forbidden",
            Self::Storage(_) => "storage",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    #[error("a template needs at least one session blueprint")]
    NoBlueprints,

    #[error("invalid {field} '{value}', expected HH:MM")]
    InvalidTime { field: &'static str, value: String },

    #[error("session '{blueprint}' ends at {end} which is not after its start at {start}")]
    EndNotAfterStart {
        blueprint: String,
        start: String,
        end: String,
    },

    #[error("day of week {0} is out of range 0-6")]
    InvalidDayOfWeek(u8),

    #[error("session '{blueprint}' capacity {capacity} is outside 1-{max}")]
    CapacityOutOfRange {
        blueprint: String,
        capacity: u32,
        max: u32,
    },

    #[error("session '{blueprint}' has {assigned} athletes assigned but capacity {capacity}")]
    CapacityExceeded {
        blueprint: String,
        assigned: usize,
        capacity: u32,
    },

    #[error("athlete {athlete_id} is assigned twice to session '{blueprint}'")]
    DuplicateAthlete {
        blueprint: String,
        athlete_id: String,
    },

    #[error("blueprint id {0} appears more than once")]
    DuplicateBlueprint(Uuid),

    #[error("blueprint id {0} does not belong to this template")]
    ForeignBlueprint(Uuid),

    #[error("{0} is too close to the end of the calendar")]
    DateOutOfRange(NaiveDate),

    #[error("{date} is not a week start; weeks begin on {expected}")]
    NotWeekStart { date: NaiveDate, expected: Weekday },

    #[error("session {session_instance_id} runs on {expected}, not {given}")]
    DateMismatch {
        session_instance_id: Uuid,
        expected: NaiveDate,
        given: NaiveDate,
    },
}

#[derive(Debug, Error)]
pub enum ConflictError {
    #[error(
        "re-materializing template {template_id} for week {week_start_date} would alter {} session(s) with recorded attendance",
        .conflicts.len()
    )]
    Reconciliation {
        template_id: Uuid,
        week_start_date: NaiveDate,
        conflicts: Vec<InstanceConflict>,
    },

    #[error(
        "attendance for athlete {athlete_id} in session {session_instance_id} on {date} was updated at {stored_updated_at}, after this write"
    )]
    ConcurrentUpdate {
        session_instance_id: Uuid,
        athlete_id: String,
        date: NaiveDate,
        stored_updated_at: DateTime<Utc>,
        attempted_at: DateTime<Utc>,
    },

    #[error("template {template_id} was modified by another writer")]
    TemplateChanged { template_id: Uuid },

    #[error("feedback for session {session_instance_id} was modified by another writer")]
    FeedbackChanged { session_instance_id: Uuid },

    #[error("session instance {session_instance_id} already exists outside schedule {template_id}:{week_start_date}")]
    InstanceTaken {
        session_instance_id: Uuid,
        template_id: Uuid,
        week_start_date: NaiveDate,
    },

    #[error("schedule for template {template_id} week {week_start_date} changed during materialization")]
    ScheduleChanged {
        template_id: Uuid,
        week_start_date: NaiveDate,
    },
}

/// A recorded instance that re-materialization would change or drop.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InstanceConflict {
    pub session_instance_id: Uuid,
    pub date: NaiveDate,
    pub attendance_records: usize,
    /// Empty when the instance would be dropped altogether.
    pub changed_fields: Vec<InstanceField>,
    pub dropped: bool,
}

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("attendance record {record_id} references missing session instance {session_instance_id}")]
    DanglingInstance {
        record_id: Uuid,
        session_instance_id: Uuid,
    },

    #[error("schedule {schedule_key} lists missing session instance {session_instance_id}")]
    MissingScheduleInstance {
        schedule_key: String,
        session_instance_id: Uuid,
    },

    #[error("record {collection}/{key} could not be decoded: {message}")]
    CorruptRecord {
        collection: &'static str,
        key: String,
        message: String,
    },
}
