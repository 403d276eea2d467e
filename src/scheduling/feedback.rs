//! Session feedback, reusable feedback templates, and the per-athlete training log
//! built from feedback.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::ledger::AttendanceLedger;
use super::stats::resolve_instance;
use super::templates::MIN_NAME_LEN;
use crate::error::{ConflictError, Error, Result, ValidationError};
use crate::models::{
    Actor, AttendanceFilter, CreateFeedbackTemplateInput, FeedbackContent, FeedbackTemplate,
    SessionFeedback, SessionInstance, TrainingLogEntry,
};
use crate::store::{Collection, Expected, RecordStore, RecordStoreExt};

#[derive(Clone)]
pub struct FeedbackBook {
    store: Arc<dyn RecordStore>,
    ledger: AttendanceLedger,
}

impl FeedbackBook {
    pub fn new(store: Arc<dyn RecordStore>, ledger: AttendanceLedger) -> Self {
        Self { store, ledger }
    }

    /// Write the feedback for a session, replacing any earlier content.
    pub fn record(
        &self,
        actor: &Actor,
        session_instance_id: Uuid,
        content: FeedbackContent,
    ) -> Result<SessionFeedback> {
        if self
            .store
            .load::<SessionInstance>(&session_instance_id.to_string())?
            .is_none()
        {
            return Err(Error::UnknownSessionInstance(session_instance_id));
        }
        let content = clean(content)?;

        let now = Utc::now();
        let key = session_instance_id.to_string();
        let (feedback, expected) = match self.store.load::<SessionFeedback>(&key)? {
            Some(existing) => (
                SessionFeedback {
                    content,
                    updated_at: now,
                    ..existing.record
                },
                Expected::Version(existing.version),
            ),
            None => (
                SessionFeedback {
                    id: Uuid::new_v4(),
                    session_instance_id,
                    content,
                    created_by: actor.user_id.clone(),
                    created_at: now,
                    updated_at: now,
                },
                Expected::Absent,
            ),
        };

        if let Err(mismatch) = self.store.compare_and_save(&feedback, expected)? {
            tracing::warn!("Lost feedback write race: {}", mismatch);
            return Err(ConflictError::FeedbackChanged { session_instance_id }.into());
        }
        tracing::info!(
            "Saved feedback for session {} (focus: {})",
            session_instance_id,
            feedback.content.main_focus
        );
        Ok(feedback)
    }

    /// Seed a session's feedback from a template. Media already attached to the
    /// session's feedback is kept.
    pub fn apply_template(
        &self,
        actor: &Actor,
        session_instance_id: Uuid,
        template_id: Uuid,
    ) -> Result<SessionFeedback> {
        let template = self.require_template(template_id)?;
        let media = self
            .get(session_instance_id)?
            .map(|f| f.content.media)
            .unwrap_or_default();

        tracing::debug!(
            "Seeding feedback for session {} from template '{}'",
            session_instance_id,
            template.name
        );
        self.record(actor, session_instance_id, template.seed(media))
    }

    pub fn get(&self, session_instance_id: Uuid) -> Result<Option<SessionFeedback>> {
        Ok(self
            .store
            .load::<SessionFeedback>(&session_instance_id.to_string())?
            .map(|v| v.record))
    }

    pub fn create_template(
        &self,
        actor: &Actor,
        input: CreateFeedbackTemplateInput,
    ) -> Result<FeedbackTemplate> {
        let name = input.name.trim().to_string();
        if name.chars().count() < MIN_NAME_LEN {
            return Err(ValidationError::TooShort {
                field: "name",
                min: MIN_NAME_LEN,
            }
            .into());
        }
        let content = clean(FeedbackContent {
            main_focus: input.main_focus,
            secondary_goals: input.secondary_goals,
            drills: input.drills,
            notes: input.notes,
            media: Vec::new(),
        })?;

        let now = Utc::now();
        let template = FeedbackTemplate {
            id: Uuid::new_v4(),
            name,
            main_focus: content.main_focus,
            secondary_goals: content.secondary_goals,
            drills: content.drills,
            notes: content.notes,
            created_by: actor.user_id.clone(),
            created_at: now,
            updated_at: now,
        };
        self.store.save(&template, Expected::Absent)?;
        tracing::info!("Created feedback template {} '{}'", template.id, template.name);
        Ok(template)
    }

    /// Feedback templates ordered by name.
    pub fn list_templates(&self) -> Result<Vec<FeedbackTemplate>> {
        let mut templates: Vec<FeedbackTemplate> = self
            .store
            .find::<FeedbackTemplate>(&[])?
            .into_iter()
            .map(|v| v.record)
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(templates)
    }

    pub fn delete_template(&self, id: Uuid) -> Result<()> {
        if !self
            .store
            .delete(Collection::FeedbackTemplates, &id.to_string())?
        {
            return Err(Error::not_found("feedback template", id));
        }
        tracing::info!("Deleted feedback template {}", id);
        Ok(())
    }

    fn require_template(&self, id: Uuid) -> Result<FeedbackTemplate> {
        self.store
            .load::<FeedbackTemplate>(&id.to_string())?
            .map(|v| v.record)
            .ok_or_else(|| Error::not_found("feedback template", id))
    }

    /// Feedback for every session the athlete attended, most recent first. Sessions
    /// without feedback are left out.
    pub fn training_log(&self, athlete_id: &str) -> Result<Vec<TrainingLogEntry>> {
        let attended = self
            .ledger
            .find(&AttendanceFilter::for_athlete(athlete_id))?
            .into_iter()
            .filter(|r| r.status.attended());

        let mut entries = Vec::new();
        for record in attended {
            let Some(feedback) = self.get(record.session_instance_id)? else {
                continue;
            };
            let session = resolve_instance(self.store.as_ref(), &record)?;

            entries.push(TrainingLogEntry {
                session_instance_id: record.session_instance_id,
                session_name: session.name,
                date: record.date,
                attendance_status: record.status,
                feedback: feedback.content,
            });
        }
        Ok(entries)
    }
}

fn clean(content: FeedbackContent) -> std::result::Result<FeedbackContent, ValidationError> {
    let main_focus = content.main_focus.trim().to_string();
    if main_focus.chars().count() < MIN_NAME_LEN {
        return Err(ValidationError::TooShort {
            field: "main_focus",
            min: MIN_NAME_LEN,
        });
    }

    let tidy = |items: Vec<String>| -> Vec<String> {
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };

    Ok(FeedbackContent {
        main_focus,
        secondary_goals: tidy(content.secondary_goals),
        drills: tidy(content.drills),
        notes: content.notes.trim().to_string(),
        media: tidy(content.media),
    })
}
