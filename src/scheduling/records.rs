//! How each aggregate is keyed and indexed in the [`RecordStore`](crate::store::RecordStore).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AttendanceRecord, FeedbackTemplate, SessionFeedback, SessionInstance, SessionSchedule,
    SessionTemplate,
};
use crate::store::{Collection, IndexField, Record};

impl Record for SessionTemplate {
    const COLLECTION: Collection = Collection::Templates;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// The stored form of a [`SessionSchedule`]: membership only. Instances are stored
/// individually so they can be resolved by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct ScheduleHeader {
    pub id: Uuid,
    pub template_id: Uuid,
    pub week_start_date: NaiveDate,
    pub instance_ids: Vec<Uuid>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleHeader {
    pub fn storage_key(&self) -> String {
        SessionSchedule::storage_key(self.template_id, self.week_start_date)
    }

    pub fn into_schedule(self, sessions: Vec<SessionInstance>) -> SessionSchedule {
        SessionSchedule {
            id: self.id,
            template_id: self.template_id,
            week_start_date: self.week_start_date,
            sessions,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Record for ScheduleHeader {
    const COLLECTION: Collection = Collection::Schedules;

    fn key(&self) -> String {
        self.storage_key()
    }

    fn index(&self) -> Vec<IndexField> {
        vec![
            ("template_id", self.template_id.to_string()),
            ("week_start_date", self.week_start_date.to_string()),
        ]
    }
}

impl Record for SessionInstance {
    const COLLECTION: Collection = Collection::Instances;

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn index(&self) -> Vec<IndexField> {
        vec![
            (
                "schedule",
                SessionSchedule::storage_key(self.template_id, self.week_start_date),
            ),
            ("date", self.date.to_string()),
        ]
    }
}

impl Record for AttendanceRecord {
    const COLLECTION: Collection = Collection::Attendance;

    fn key(&self) -> String {
        AttendanceRecord::storage_key(self.session_instance_id, &self.athlete_id, self.date)
    }

    fn index(&self) -> Vec<IndexField> {
        vec![
            ("session_instance_id", self.session_instance_id.to_string()),
            ("athlete_id", self.athlete_id.clone()),
            ("date", self.date.to_string()),
        ]
    }
}

impl Record for SessionFeedback {
    const COLLECTION: Collection = Collection::Feedback;

    fn key(&self) -> String {
        self.session_instance_id.to_string()
    }
}

impl Record for FeedbackTemplate {
    const COLLECTION: Collection = Collection::FeedbackTemplates;

    fn key(&self) -> String {
        self.id.to_string()
    }
}
