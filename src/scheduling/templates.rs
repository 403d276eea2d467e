//! Template definitions and their validation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::calendar::SessionTime;
use crate::error::{ConflictError, Error, Result, ValidationError};
use crate::models::{
    Actor, BlueprintInput, CreateTemplateInput, SessionBlueprint, SessionTemplate,
    UpdateTemplateInput,
};
use crate::roster::AthleteScope;
use crate::store::{Expected, RecordStore, RecordStoreExt};

/// Largest group a single session may hold.
pub const MAX_CAPACITY: u32 = 20;
/// Minimum length of template and session names.
pub const MIN_NAME_LEN: usize = 2;

/// Owns [`SessionTemplate`] definitions.
#[derive(Clone)]
pub struct TemplateStore {
    store: Arc<dyn RecordStore>,
}

impl TemplateStore {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        actor: &Actor,
        scope: &AthleteScope,
        input: CreateTemplateInput,
    ) -> Result<SessionTemplate> {
        let name = validate_name("name", &input.name)?;
        let blueprints = build_blueprints(input.blueprints, &HashSet::new())?;
        check_roster_scope(actor, scope, &blueprints, &[])?;

        let now = Utc::now();
        let template = SessionTemplate {
            id: Uuid::new_v4(),
            name,
            description: input.description.trim().to_string(),
            blueprints,
            created_by: actor.user_id.clone(),
            created_at: now,
            updated_at: now,
            archived_at: None,
        };

        self.store.save(&template, Expected::Absent)?;
        tracing::info!(
            "Created template {} '{}' with {} sessions",
            template.id,
            template.name,
            template.blueprints.len()
        );
        Ok(template)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<SessionTemplate>> {
        Ok(self
            .store
            .load::<SessionTemplate>(&id.to_string())?
            .map(|v| v.record))
    }

    pub fn require(&self, id: Uuid) -> Result<SessionTemplate> {
        self.get(id)?
            .ok_or_else(|| Error::not_found("template", id))
    }

    /// Templates ordered by name.
    pub fn list(&self, include_archived: bool) -> Result<Vec<SessionTemplate>> {
        let mut templates: Vec<SessionTemplate> = self
            .store
            .find::<SessionTemplate>(&[])?
            .into_iter()
            .map(|v| v.record)
            .filter(|t| include_archived || !t.is_archived())
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(templates)
    }

    /// Apply a partial update. Weeks that were already materialized are untouched
    /// until they are materialized again.
    pub fn update(
        &self,
        actor: &Actor,
        scope: &AthleteScope,
        id: Uuid,
        input: UpdateTemplateInput,
    ) -> Result<SessionTemplate> {
        let existing = self
            .store
            .load::<SessionTemplate>(&id.to_string())?
            .ok_or_else(|| Error::not_found("template", id))?;
        let mut template = existing.record;

        if template.is_archived() {
            return Err(Error::InvalidTemplate {
                template_id: id,
                reason: "template is archived".to_string(),
            });
        }

        if let Some(name) = input.name {
            template.name = validate_name("name", &name)?;
        }
        if let Some(description) = input.description {
            template.description = description.trim().to_string();
        }
        if let Some(blueprints) = input.blueprints {
            let known: HashSet<Uuid> = template.blueprints.iter().map(|b| b.id).collect();
            let blueprints = build_blueprints(blueprints, &known)?;
            check_roster_scope(actor, scope, &blueprints, &template.blueprints)?;
            template.blueprints = blueprints;
        }
        template.updated_at = Utc::now();

        self.save_over(&template, existing.version)?;
        tracing::info!("Updated template {} '{}'", template.id, template.name);
        Ok(template)
    }

    /// Archive a template. Its schedules stay readable, but it can no longer be
    /// materialized or edited. Archiving twice is a no-op.
    pub fn archive(&self, id: Uuid) -> Result<SessionTemplate> {
        let existing = self
            .store
            .load::<SessionTemplate>(&id.to_string())?
            .ok_or_else(|| Error::not_found("template", id))?;
        let mut template = existing.record;
        if template.is_archived() {
            return Ok(template);
        }

        let now = Utc::now();
        template.archived_at = Some(now);
        template.updated_at = now;
        self.save_over(&template, existing.version)?;
        tracing::info!("Archived template {} '{}'", template.id, template.name);
        Ok(template)
    }

    fn save_over(&self, template: &SessionTemplate, version: i64) -> Result<()> {
        match self
            .store
            .compare_and_save(template, Expected::Version(version))?
        {
            Ok(_) => Ok(()),
            Err(mismatch) => {
                tracing::warn!("Lost template update race: {}", mismatch);
                Err(ConflictError::TemplateChanged {
                    template_id: template.id,
                }
                .into())
            }
        }
    }
}

fn validate_name(field: &'static str, raw: &str) -> std::result::Result<String, ValidationError> {
    let name = raw.trim();
    if name.chars().count() < MIN_NAME_LEN {
        return Err(ValidationError::TooShort {
            field,
            min: MIN_NAME_LEN,
        });
    }
    Ok(name.to_string())
}

fn parse_time(field: &'static str, raw: &str) -> std::result::Result<SessionTime, ValidationError> {
    SessionTime::parse(raw.trim()).ok_or_else(|| ValidationError::InvalidTime {
        field,
        value: raw.to_string(),
    })
}

/// Turn raw inputs into blueprints, minting ids for new ones. A supplied id must be one
/// of `known`, the ids the template already has; instance ids derive from blueprint ids,
/// so an id borrowed from another template would collide with its instances.
fn build_blueprints(
    inputs: Vec<BlueprintInput>,
    known: &HashSet<Uuid>,
) -> std::result::Result<Vec<SessionBlueprint>, ValidationError> {
    if inputs.is_empty() {
        return Err(ValidationError::NoBlueprints);
    }

    let mut seen = HashSet::new();
    let mut blueprints = Vec::with_capacity(inputs.len());
    for input in inputs {
        let id = match input.id {
            Some(id) if !known.contains(&id) => return Err(ValidationError::ForeignBlueprint(id)),
            Some(id) => id,
            None => Uuid::new_v4(),
        };
        if !seen.insert(id) {
            return Err(ValidationError::DuplicateBlueprint(id));
        }

        let blueprint = SessionBlueprint {
            id,
            name: validate_name("session name", &input.name)?,
            day_of_week: input.day_of_week,
            start_time: parse_time("start_time", &input.start_time)?,
            end_time: parse_time("end_time", &input.end_time)?,
            max_capacity: input.max_capacity,
            assigned_athlete_ids: input
                .assigned_athlete_ids
                .into_iter()
                .map(|id| id.trim().to_string())
                .collect(),
            excluded_dates: input.excluded_dates,
        };
        validate_blueprint(&blueprint)?;
        blueprints.push(blueprint);
    }
    Ok(blueprints)
}

/// Structural checks on a blueprint. Also run at materialization, since stored
/// templates may predate a rule.
pub fn validate_blueprint(blueprint: &SessionBlueprint) -> std::result::Result<(), ValidationError> {
    if blueprint.day_of_week > 6 {
        return Err(ValidationError::InvalidDayOfWeek(blueprint.day_of_week));
    }
    if blueprint.end_time <= blueprint.start_time {
        return Err(ValidationError::EndNotAfterStart {
            blueprint: blueprint.name.clone(),
            start: blueprint.start_time.to_string(),
            end: blueprint.end_time.to_string(),
        });
    }
    if blueprint.max_capacity == 0 || blueprint.max_capacity > MAX_CAPACITY {
        return Err(ValidationError::CapacityOutOfRange {
            blueprint: blueprint.name.clone(),
            capacity: blueprint.max_capacity,
            max: MAX_CAPACITY,
        });
    }
    check_capacity(blueprint)?;

    let mut seen = HashSet::new();
    for athlete_id in &blueprint.assigned_athlete_ids {
        if !seen.insert(athlete_id.as_str()) {
            return Err(ValidationError::DuplicateAthlete {
                blueprint: blueprint.name.clone(),
                athlete_id: athlete_id.clone(),
            });
        }
    }
    Ok(())
}

/// `assigned_athlete_ids.len() <= max_capacity`.
pub fn check_capacity(blueprint: &SessionBlueprint) -> std::result::Result<(), ValidationError> {
    if blueprint.assigned_athlete_ids.len() > blueprint.max_capacity as usize {
        return Err(ValidationError::CapacityExceeded {
            blueprint: blueprint.name.clone(),
            assigned: blueprint.assigned_athlete_ids.len(),
            capacity: blueprint.max_capacity,
        });
    }
    Ok(())
}

/// Every newly assigned athlete must be visible to the caller. Athletes already on a
/// blueprint may stay even if the caller cannot see them.
fn check_roster_scope(
    actor: &Actor,
    scope: &AthleteScope,
    blueprints: &[SessionBlueprint],
    previous: &[SessionBlueprint],
) -> Result<()> {
    for blueprint in blueprints {
        let before = previous.iter().find(|b| b.id == blueprint.id);
        for athlete_id in &blueprint.assigned_athlete_ids {
            let already_assigned =
                before.is_some_and(|b| b.assigned_athlete_ids.contains(athlete_id));
            if !already_assigned && !scope.permits(athlete_id) {
                tracing::warn!(
                    "User {} tried to assign athlete {} outside their roster",
                    actor.user_id,
                    athlete_id
                );
                return Err(Error::AthleteNotVisible {
                    athlete_id: athlete_id.clone(),
                    user_id: actor.user_id.clone(),
                });
            }
        }
    }
    Ok(())
}
