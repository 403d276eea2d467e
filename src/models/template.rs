use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AthleteId;
use crate::calendar::SessionTime;

/// A reusable week of training sessions.
///
/// Templates are definitions only. Nothing happens on the calendar until a template is
/// materialized for a specific week, and later edits never reach back into weeks that
/// were already materialized.
///
/// Templates are archived rather than deleted, so schedules built from them stay
/// readable. An archived template cannot be materialized again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Ordered as supplied by the author.
    pub blueprints: Vec<SessionBlueprint>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl SessionTemplate {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub fn blueprint(&self, id: Uuid) -> Option<&SessionBlueprint> {
        self.blueprints.iter().find(|b| b.id == id)
    }
}

/// One recurring slot within a template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionBlueprint {
    pub id: Uuid,
    pub name: String,
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: u8,
    pub start_time: SessionTime,
    pub end_time: SessionTime,
    pub max_capacity: u32,
    /// Never longer than `max_capacity`.
    pub assigned_athlete_ids: Vec<AthleteId>,
    /// Dates on which this slot does not run.
    #[serde(default)]
    pub excluded_dates: BTreeSet<NaiveDate>,
}

impl SessionBlueprint {
    pub fn is_excluded(&self, date: NaiveDate) -> bool {
        self.excluded_dates.contains(&date)
    }
}

/// Input for one blueprint. Times are raw strings so malformed values surface as
/// validation errors rather than decode failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintInput {
    /// Keep an existing blueprint's identity when updating a template. Instances of
    /// a blueprint are only reconciled against the same blueprint id.
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    pub max_capacity: u32,
    #[serde(default)]
    pub assigned_athlete_ids: Vec<AthleteId>,
    #[serde(default)]
    pub excluded_dates: BTreeSet<NaiveDate>,
}

/// Input for creating a new template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTemplateInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub blueprints: Vec<BlueprintInput>,
}

/// Input for updating a template. All fields are optional for partial updates;
/// `blueprints`, when present, replaces the whole set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTemplateInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub blueprints: Option<Vec<BlueprintInput>>,
}

/// Query parameters for listing templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTemplatesQuery {
    #[serde(default)]
    pub include_archived: bool,
}
