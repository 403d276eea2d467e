use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AttendanceStatus;

/// Coach feedback for one session instance. At most one per instance; writing again
/// replaces the content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionFeedback {
    pub id: Uuid,
    pub session_instance_id: Uuid,
    #[serde(flatten)]
    pub content: FeedbackContent,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedbackContent {
    pub main_focus: String,
    #[serde(default)]
    pub secondary_goals: Vec<String>,
    #[serde(default)]
    pub drills: Vec<String>,
    #[serde(default)]
    pub notes: String,
    /// Links to media captured during the session.
    #[serde(default)]
    pub media: Vec<String>,
}

/// One line of an athlete's training log: a session they attended and the feedback
/// written for it.
///
/// The log is derived on read from attendance and feedback, so it follows later edits
/// to either.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingLogEntry {
    pub session_instance_id: Uuid,
    pub session_name: String,
    pub date: NaiveDate,
    pub attendance_status: AttendanceStatus,
    pub feedback: FeedbackContent,
}

/// A reusable starting point for session feedback, kept by coaches for recurring
/// focuses. Applying one copies its content; later edits or deletion of the template
/// leave existing feedback alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackTemplate {
    pub id: Uuid,
    pub name: String,
    pub main_focus: String,
    pub secondary_goals: Vec<String>,
    pub drills: Vec<String>,
    pub notes: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedbackTemplate {
    /// Session feedback content seeded from this template, carrying over `media`.
    pub fn seed(&self, media: Vec<String>) -> FeedbackContent {
        FeedbackContent {
            main_focus: self.main_focus.clone(),
            secondary_goals: self.secondary_goals.clone(),
            drills: self.drills.clone(),
            notes: self.notes.clone(),
            media,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateFeedbackTemplateInput {
    pub name: String,
    pub main_focus: String,
    #[serde(default)]
    pub secondary_goals: Vec<String>,
    #[serde(default)]
    pub drills: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyFeedbackTemplateInput {
    pub template_id: Uuid,
}
