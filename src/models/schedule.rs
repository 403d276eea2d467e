use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AthleteId, AttendanceRecord, SessionBlueprint};
use crate::calendar::SessionTime;

/// Namespace for UUIDv5 identifiers of materialized entities.
const MATERIALIZED_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b7e_93d4_4a0f_8e55_0c1d_7a2b_9e30);

/// One concrete, dated occurrence of a blueprint.
///
/// The id is derived from `(blueprint_id, week_start_date)`, so materializing the same
/// week twice yields the same instances. `athlete_ids` is a copy of the blueprint's
/// roster at materialization time. Once any attendance references the instance it is
/// never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInstance {
    pub id: Uuid,
    pub template_id: Uuid,
    pub blueprint_id: Uuid,
    pub week_start_date: NaiveDate,
    pub name: String,
    pub date: NaiveDate,
    pub start_time: SessionTime,
    pub end_time: SessionTime,
    pub capacity: u32,
    pub athlete_ids: Vec<AthleteId>,
}

impl SessionInstance {
    pub fn derive_id(blueprint_id: Uuid, week_start_date: NaiveDate) -> Uuid {
        let name = format!("instance:{}:{}", blueprint_id, week_start_date);
        Uuid::new_v5(&MATERIALIZED_NAMESPACE, name.as_bytes())
    }

    pub fn from_blueprint(
        template_id: Uuid,
        week_start_date: NaiveDate,
        date: NaiveDate,
        blueprint: &SessionBlueprint,
    ) -> Self {
        Self {
            id: Self::derive_id(blueprint.id, week_start_date),
            template_id,
            blueprint_id: blueprint.id,
            week_start_date,
            name: blueprint.name.clone(),
            date,
            start_time: blueprint.start_time,
            end_time: blueprint.end_time,
            capacity: blueprint.max_capacity,
            athlete_ids: blueprint.assigned_athlete_ids.clone(),
        }
    }

    /// Fields that differ between a stored instance and a freshly derived one.
    pub fn changed_fields(&self, other: &SessionInstance) -> Vec<InstanceField> {
        let mut fields = Vec::new();
        if self.name != other.name {
            fields.push(InstanceField::Name);
        }
        if self.date != other.date {
            fields.push(InstanceField::Date);
        }
        if self.start_time != other.start_time {
            fields.push(InstanceField::StartTime);
        }
        if self.end_time != other.end_time {
            fields.push(InstanceField::EndTime);
        }
        if self.capacity != other.capacity {
            fields.push(InstanceField::Capacity);
        }
        if self.athlete_ids != other.athlete_ids {
            fields.push(InstanceField::Roster);
        }
        fields
    }

    /// Sort key for schedules: date, then start time.
    pub fn chronological_key(&self) -> (NaiveDate, SessionTime, &str) {
        (self.date, self.start_time, self.name.as_str())
    }
}

/// A materialized instance property that reconciliation compares.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstanceField {
    Name,
    Date,
    StartTime,
    EndTime,
    Capacity,
    Roster,
}

/// One template expanded for one week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSchedule {
    pub id: Uuid,
    pub template_id: Uuid,
    pub week_start_date: NaiveDate,
    /// Ordered by date, then start time.
    pub sessions: Vec<SessionInstance>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionSchedule {
    pub fn derive_id(template_id: Uuid, week_start_date: NaiveDate) -> Uuid {
        let name = format!("schedule:{}:{}", template_id, week_start_date);
        Uuid::new_v5(&MATERIALIZED_NAMESPACE, name.as_bytes())
    }

    pub fn storage_key(template_id: Uuid, week_start_date: NaiveDate) -> String {
        format!("{}:{}", template_id, week_start_date)
    }
}

/// What to do when re-materializing would change an instance that already has
/// attendance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Reject the whole materialization with a reconciliation conflict.
    #[default]
    Fail,
    /// Keep recorded instances exactly as stored and reconcile everything else.
    KeepRecorded,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fail => "fail",
            Self::KeepRecorded => "keep_recorded",
        }
    }
}

/// Input for materializing a template into a week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializeWeekInput {
    pub template_id: Uuid,
    /// Must fall on the configured first day of the week.
    pub week_start_date: NaiveDate,
    #[serde(default)]
    pub on_conflict: ConflictPolicy,
}

/// Query parameters for listing schedules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSchedulesQuery {
    pub week_start_date: Option<NaiveDate>,
}

/// Everything planned and recorded for one week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekOverview {
    pub week_start_date: NaiveDate,
    pub schedules: Vec<SessionSchedule>,
    /// Attendance recorded against any instance of `schedules`, most recent first.
    pub attendance: Vec<AttendanceRecord>,
}
