use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AthleteId, SessionInstance};

/// One athlete's attendance for one session instance on one date.
///
/// Exactly one record exists per `(session_instance_id, athlete_id, date)`. Recording
/// again for the same key overwrites `status` and `notes` in place; the identity fields
/// and `created_at` never change, and records are never removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub session_instance_id: Uuid,
    pub athlete_id: AthleteId,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub notes: Option<String>,
    /// User id of whoever wrote the current status.
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn storage_key(session_instance_id: Uuid, athlete_id: &str, date: NaiveDate) -> String {
        format!("{}:{}:{}", session_instance_id, date, athlete_id)
    }
}

/// Recorded attendance outcome.
///
/// - `Present`: Attended on time; the only status that counts towards the attendance rate
/// - `Late`: Attended, but late
/// - `Absent`: Did not attend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
            Self::Absent => "absent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Self::Present),
            "late" => Some(Self::Late),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }

    /// Whether the athlete took part in the session at all.
    pub fn attended(&self) -> bool {
        matches!(self, Self::Present | Self::Late)
    }
}

/// Input for recording attendance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAttendanceInput {
    pub session_instance_id: Uuid,
    pub athlete_id: AthleteId,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub notes: Option<String>,
    /// The `updated_at` the caller last saw. If the stored record is newer, the write
    /// is rejected as a concurrent update instead of overwriting it.
    #[serde(default)]
    pub expected_updated_at: Option<DateTime<Utc>>,
}

/// Attendance query. Every present field must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttendanceFilter {
    pub session_instance_id: Option<Uuid>,
    pub athlete_id: Option<AthleteId>,
    pub date: Option<NaiveDate>,
}

impl AttendanceFilter {
    pub fn for_instance(session_instance_id: Uuid) -> Self {
        Self {
            session_instance_id: Some(session_instance_id),
            ..Self::default()
        }
    }

    pub fn for_athlete(athlete_id: impl Into<AthleteId>) -> Self {
        Self {
            athlete_id: Some(athlete_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.session_instance_id
            .is_none_or(|id| record.session_instance_id == id)
            && self
                .athlete_id
                .as_ref()
                .is_none_or(|id| &record.athlete_id == id)
            && self.date.is_none_or(|d| record.date == d)
    }
}

/// Attendance sheet for a single session: the snapshot roster with what has been
/// recorded so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSheet {
    pub session: SessionInstance,
    pub entries: Vec<SheetEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SheetEntry {
    pub athlete_id: AthleteId,
    /// False for athletes recorded against the session without being on its roster.
    pub rostered: bool,
    /// `None` until attendance is recorded.
    pub status: Option<AttendanceStatus>,
    pub notes: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}
