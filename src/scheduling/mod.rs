//! The scheduling and attendance core.
//!
//! [`Scheduler`] ties the components together and is what the HTTP and CLI surfaces
//! talk to. Every call that touches athletes first asks the [`RosterGate`] which
//! athletes the caller may see.

mod records;

pub mod feedback;
pub mod ledger;
pub mod materializer;
pub mod stats;
pub mod templates;

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::calendar::WeekStart;
use crate::error::{Error, Result, ValidationError};
use crate::models::{
    Actor, AttendanceFilter, AttendanceRecord, AttendanceStats, CreateFeedbackTemplateInput,
    CreateTemplateInput, FeedbackContent, FeedbackTemplate, MaterializeWeekInput, RecordAttendanceInput, SessionFeedback,
    SessionInstance, SessionSchedule, SessionSheet, SessionTemplate, TrainingLogEntry,
    UpdateTemplateInput, WeekOverview,
};
use crate::roster::{AthleteScope, RosterGate};
use crate::store::RecordStore;

pub use feedback::FeedbackBook;
pub use ledger::AttendanceLedger;
pub use materializer::{KeyedLocks, ScheduleMaterializer};
pub use stats::{StatsAggregator, Tally, DEFAULT_RECENT_LIMIT};
pub use templates::TemplateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingSettings {
    pub week_start: WeekStart,
    /// How many records `recent_attendance` carries.
    pub recent_limit: usize,
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            week_start: WeekStart::default(),
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    roster: Arc<dyn RosterGate>,
    settings: SchedulingSettings,
    templates: TemplateStore,
    materializer: ScheduleMaterializer,
    ledger: AttendanceLedger,
    stats: StatsAggregator,
    feedback: FeedbackBook,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        roster: Arc<dyn RosterGate>,
        settings: SchedulingSettings,
    ) -> Self {
        let locks = Arc::new(KeyedLocks::default());
        let ledger = AttendanceLedger::new(store.clone(), locks.clone());
        Self {
            roster,
            settings,
            templates: TemplateStore::new(store.clone()),
            materializer: ScheduleMaterializer::new(store.clone(), locks, settings.week_start),
            stats: StatsAggregator::new(store.clone(), settings.recent_limit),
            feedback: FeedbackBook::new(store, ledger.clone()),
            ledger,
        }
    }

    pub fn settings(&self) -> SchedulingSettings {
        self.settings
    }

    // Templates

    pub fn create_template(&self, actor: &Actor, input: CreateTemplateInput) -> Result<SessionTemplate> {
        let scope = self.scope(actor)?;
        self.templates.create(actor, &scope, input)
    }

    pub fn get_template(&self, id: Uuid) -> Result<SessionTemplate> {
        self.templates.require(id)
    }

    pub fn list_templates(&self, include_archived: bool) -> Result<Vec<SessionTemplate>> {
        self.templates.list(include_archived)
    }

    pub fn update_template(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdateTemplateInput,
    ) -> Result<SessionTemplate> {
        let scope = self.scope(actor)?;
        self.templates.update(actor, &scope, id, input)
    }

    pub fn archive_template(&self, id: Uuid) -> Result<SessionTemplate> {
        self.templates.archive(id)
    }

    // Schedules

    pub fn materialize_week(&self, actor: &Actor, input: MaterializeWeekInput) -> Result<SessionSchedule> {
        self.materializer.materialize(actor, input)
    }

    pub fn get_schedule(&self, template_id: Uuid, week_start_date: NaiveDate) -> Result<SessionSchedule> {
        self.materializer.check_week_start(week_start_date)?;
        self.materializer
            .get(template_id, week_start_date)?
            .ok_or_else(|| Error::not_found("schedule", format!("{}:{}", template_id, week_start_date)))
    }

    pub fn list_schedules(&self, week_start_date: Option<NaiveDate>) -> Result<Vec<SessionSchedule>> {
        self.materializer.list(week_start_date)
    }

    pub fn get_instance(&self, id: Uuid) -> Result<SessionInstance> {
        self.materializer
            .instance(id)?
            .ok_or(Error::UnknownSessionInstance(id))
    }

    /// The canonical week start for any date.
    pub fn week_start_for(&self, date: NaiveDate) -> Result<NaiveDate> {
        self.settings
            .week_start
            .week_of(date)
            .ok_or_else(|| ValidationError::DateOutOfRange(date).into())
    }

    pub fn week_overview(&self, actor: &Actor, week_start_date: NaiveDate) -> Result<WeekOverview> {
        self.materializer.check_week_start(week_start_date)?;
        let scope = self.scope(actor)?;

        let schedules = self.materializer.list(Some(week_start_date))?;
        let mut attendance = Vec::new();
        for session in schedules.iter().flat_map(|s| &s.sessions) {
            attendance.extend(
                self.ledger
                    .find(&AttendanceFilter::for_instance(session.id))?
                    .into_iter()
                    .filter(|r| scope.permits(&r.athlete_id)),
            );
        }
        ledger::sort_most_recent_first(&mut attendance);

        Ok(WeekOverview {
            week_start_date,
            schedules,
            attendance,
        })
    }

    // Attendance

    pub fn record_attendance(&self, actor: &Actor, input: RecordAttendanceInput) -> Result<AttendanceRecord> {
        let scope = self.scope(actor)?;
        self.ledger.record(actor, &scope, input)
    }

    /// Records matching `filter` for athletes the caller can see.
    pub fn get_attendance(&self, actor: &Actor, filter: &AttendanceFilter) -> Result<Vec<AttendanceRecord>> {
        let scope = self.scope(actor)?;
        if let Some(athlete_id) = &filter.athlete_id {
            self.require_visible(actor, &scope, athlete_id)?;
        }
        Ok(self
            .ledger
            .find(filter)?
            .into_iter()
            .filter(|r| scope.permits(&r.athlete_id))
            .collect())
    }

    pub fn session_sheet(&self, actor: &Actor, session_instance_id: Uuid) -> Result<SessionSheet> {
        let scope = self.scope(actor)?;
        let instance = self.get_instance(session_instance_id)?;
        let mut sheet = self.ledger.sheet(instance)?;
        sheet.entries.retain(|e| scope.permits(&e.athlete_id));
        Ok(sheet)
    }

    pub fn attendance_stats(
        &self,
        actor: &Actor,
        athlete_id: &str,
        as_of: Option<NaiveDate>,
    ) -> Result<AttendanceStats> {
        let scope = self.scope(actor)?;
        self.require_visible(actor, &scope, athlete_id)?;
        self.stats.compute(athlete_id, as_of)
    }

    // Feedback

    pub fn record_feedback(
        &self,
        actor: &Actor,
        session_instance_id: Uuid,
        content: FeedbackContent,
    ) -> Result<SessionFeedback> {
        self.feedback.record(actor, session_instance_id, content)
    }

    pub fn apply_feedback_template(
        &self,
        actor: &Actor,
        session_instance_id: Uuid,
        template_id: Uuid,
    ) -> Result<SessionFeedback> {
        self.feedback
            .apply_template(actor, session_instance_id, template_id)
    }

    pub fn create_feedback_template(
        &self,
        actor: &Actor,
        input: CreateFeedbackTemplateInput,
    ) -> Result<FeedbackTemplate> {
        self.feedback.create_template(actor, input)
    }

    pub fn list_feedback_templates(&self) -> Result<Vec<FeedbackTemplate>> {
        self.feedback.list_templates()
    }

    pub fn delete_feedback_template(&self, id: Uuid) -> Result<()> {
        self.feedback.delete_template(id)
    }

    pub fn get_feedback(&self, session_instance_id: Uuid) -> Result<SessionFeedback> {
        self.feedback
            .get(session_instance_id)?
            .ok_or_else(|| Error::not_found("feedback", session_instance_id))
    }

    pub fn training_log(&self, actor: &Actor, athlete_id: &str) -> Result<Vec<TrainingLogEntry>> {
        let scope = self.scope(actor)?;
        self.require_visible(actor, &scope, athlete_id)?;
        self.feedback.training_log(athlete_id)
    }

    fn scope(&self, actor: &Actor) -> Result<AthleteScope> {
        self.roster
            .resolve_visible_athletes(actor.role, &actor.user_id)
            .map_err(|e| {
                tracing::error!("Roster lookup failed for user {}: {:#}", actor.user_id, e);
                Error::Storage(e)
            })
    }

    fn require_visible(&self, actor: &Actor, scope: &AthleteScope, athlete_id: &str) -> Result<()> {
        if scope.permits(athlete_id) {
            return Ok(());
        }
        tracing::warn!(
            "User {} asked for athlete {} outside their roster",
            actor.user_id,
            athlete_id
        );
        Err(Error::AthleteNotVisible {
            athlete_id: athlete_id.to_string(),
            user_id: actor.user_id.clone(),
        })
    }
}
