//! Expanding templates into dated weeks.
//!
//! Materializing `(template, week)` is idempotent: instance ids are derived from
//! `(blueprint, week)`, and a second run against an existing schedule reconciles
//! instead of regenerating. Instances that already carry attendance are never
//! rewritten or removed; if the template has drifted away from one of them the run
//! fails with [`ConflictError::Reconciliation`] unless the caller asked to keep
//! recorded instances as they are.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use super::records::ScheduleHeader;
use super::templates::check_capacity;
use crate::calendar::WeekStart;
use crate::error::{ConflictError, Error, InstanceConflict, IntegrityError, Result, ValidationError};
use crate::models::{
    Actor, AttendanceRecord, ConflictPolicy, MaterializeWeekInput, SessionInstance,
    SessionSchedule, SessionTemplate,
};
use crate::store::{Collection, Expected, RecordStore, RecordStoreExt};

/// Per-key advisory locks, keyed by schedule. Materializations of the same
/// `(template, week)`, and attendance writes against its instances, run one at a time
/// within this process; the schedule version check covers other processes.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        locks.entry(key.to_string()).or_default().clone()
    }
}

/// What a materialization run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Changes {
    written: usize,
    removed: usize,
    kept_recorded: usize,
}

#[derive(Clone)]
pub struct ScheduleMaterializer {
    store: Arc<dyn RecordStore>,
    locks: Arc<KeyedLocks>,
    week_start: WeekStart,
}

impl ScheduleMaterializer {
    pub fn new(store: Arc<dyn RecordStore>, locks: Arc<KeyedLocks>, week_start: WeekStart) -> Self {
        Self {
            store,
            locks,
            week_start,
        }
    }

    pub fn week_start(&self) -> WeekStart {
        self.week_start
    }

    pub fn materialize(&self, actor: &Actor, input: MaterializeWeekInput) -> Result<SessionSchedule> {
        let week = input.week_start_date;
        self.check_week_start(week)?;

        let template = self
            .store
            .load::<SessionTemplate>(&input.template_id.to_string())?
            .map(|v| v.record)
            .ok_or_else(|| Error::InvalidTemplate {
                template_id: input.template_id,
                reason: "template does not exist".to_string(),
            })?;
        if template.is_archived() {
            return Err(Error::InvalidTemplate {
                template_id: template.id,
                reason: "template is archived".to_string(),
            });
        }

        let desired = self.plan(&template, week)?;
        let key = SessionSchedule::storage_key(template.id, week);

        let lock = self.locks.lock_for(&key);
        let _guard = lock.lock().expect("materialization lock poisoned");

        let (schedule, changes) = match self.store.load::<ScheduleHeader>(&key)? {
            None => self.create_schedule(actor, &template, week, desired)?,
            Some(existing) => self.reconcile(
                &template,
                existing.record,
                existing.version,
                desired,
                input.on_conflict,
            )?,
        };

        tracing::info!(
            "Materialized template {} for week {}: {} sessions ({} written, {} removed, {} kept with attendance)",
            template.id,
            week,
            schedule.sessions.len(),
            changes.written,
            changes.removed,
            changes.kept_recorded
        );
        Ok(schedule)
    }

    pub fn check_week_start(&self, week: NaiveDate) -> Result<()> {
        if !self.week_start.is_week_start(week) {
            return Err(ValidationError::NotWeekStart {
                date: week,
                expected: self.week_start.weekday(),
            }
            .into());
        }
        Ok(())
    }

    /// The instances the template calls for in `week`, in schedule order.
    pub fn plan(&self, template: &SessionTemplate, week: NaiveDate) -> Result<Vec<SessionInstance>> {
        let mut instances = Vec::with_capacity(template.blueprints.len());
        for blueprint in &template.blueprints {
            check_capacity(blueprint)?;
            if blueprint.day_of_week > 6 {
                return Err(ValidationError::InvalidDayOfWeek(blueprint.day_of_week).into());
            }

            let date = self
                .week_start
                .date_in_week(week, blueprint.day_of_week)
                .ok_or(ValidationError::DateOutOfRange(week))?;
            if blueprint.is_excluded(date) {
                tracing::debug!(
                    "Skipping '{}' on {}: date is excluded",
                    blueprint.name,
                    date
                );
                continue;
            }
            instances.push(SessionInstance::from_blueprint(template.id, week, date, blueprint));
        }
        sort_sessions(&mut instances);
        Ok(instances)
    }

    pub fn get(&self, template_id: Uuid, week: NaiveDate) -> Result<Option<SessionSchedule>> {
        let key = SessionSchedule::storage_key(template_id, week);
        match self.store.load::<ScheduleHeader>(&key)? {
            Some(header) => Ok(Some(self.assemble(header.record)?)),
            None => Ok(None),
        }
    }

    /// Schedules ordered by week, then template.
    pub fn list(&self, week: Option<NaiveDate>) -> Result<Vec<SessionSchedule>> {
        let week_filter = week.map(|w| w.to_string());
        let filters: Vec<(&str, &str)> = match &week_filter {
            Some(w) => vec![("week_start_date", w.as_str())],
            None => Vec::new(),
        };

        let mut schedules = self
            .store
            .find::<ScheduleHeader>(&filters)?
            .into_iter()
            .map(|v| self.assemble(v.record))
            .collect::<Result<Vec<_>>>()?;
        schedules.sort_by(|a, b| {
            a.week_start_date
                .cmp(&b.week_start_date)
                .then(a.template_id.cmp(&b.template_id))
        });
        Ok(schedules)
    }

    pub fn instance(&self, id: Uuid) -> Result<Option<SessionInstance>> {
        Ok(self
            .store
            .load::<SessionInstance>(&id.to_string())?
            .map(|v| v.record))
    }

    fn create_schedule(
        &self,
        actor: &Actor,
        template: &SessionTemplate,
        week: NaiveDate,
        desired: Vec<SessionInstance>,
    ) -> Result<(SessionSchedule, Changes)> {
        let now = Utc::now();
        let header = ScheduleHeader {
            id: SessionSchedule::derive_id(template.id, week),
            template_id: template.id,
            week_start_date: week,
            instance_ids: desired.iter().map(|i| i.id).collect(),
            created_by: actor.user_id.clone(),
            created_at: now,
            updated_at: now,
        };

        self.ensure_unclaimed(desired.iter())?;
        self.claim(&header, Expected::Absent)?;
        for instance in &desired {
            self.insert_instance(instance)?;
        }

        let changes = Changes {
            written: desired.len(),
            ..Changes::default()
        };
        Ok((header.into_schedule(desired), changes))
    }

    fn reconcile(
        &self,
        template: &SessionTemplate,
        mut header: ScheduleHeader,
        version: i64,
        desired: Vec<SessionInstance>,
        policy: ConflictPolicy,
    ) -> Result<(SessionSchedule, Changes)> {
        let stored = self.load_instances(&header)?;

        let mut target: BTreeMap<Uuid, SessionInstance> =
            desired.into_iter().map(|i| (i.id, i)).collect();
        let mut conflicts = Vec::new();
        let mut changes = Changes::default();

        for instance in &stored {
            let instance_key = instance.id.to_string();
            let recorded = self
                .store
                .find::<AttendanceRecord>(&[("session_instance_id", instance_key.as_str())])?
                .len();
            if recorded == 0 {
                continue;
            }

            match target.get(&instance.id) {
                Some(wanted) if wanted == instance => {}
                Some(wanted) => conflicts.push(InstanceConflict {
                    session_instance_id: instance.id,
                    date: instance.date,
                    attendance_records: recorded,
                    changed_fields: instance.changed_fields(wanted),
                    dropped: false,
                }),
                None => conflicts.push(InstanceConflict {
                    session_instance_id: instance.id,
                    date: instance.date,
                    attendance_records: recorded,
                    changed_fields: Vec::new(),
                    dropped: true,
                }),
            }

            target.insert(instance.id, instance.clone());
            changes.kept_recorded += 1;
        }

        if !conflicts.is_empty() {
            tracing::warn!(
                "Template {} week {} conflicts with {} recorded sessions (policy: {})",
                template.id,
                header.week_start_date,
                conflicts.len(),
                policy.as_str()
            );
            if policy == ConflictPolicy::Fail {
                return Err(ConflictError::Reconciliation {
                    template_id: template.id,
                    week_start_date: header.week_start_date,
                    conflicts,
                }
                .into());
            }
        }

        let mut sessions: Vec<SessionInstance> = target.into_values().collect();
        sort_sessions(&mut sessions);

        let to_write: Vec<&SessionInstance> = sessions
            .iter()
            .filter(|i| !stored.contains(*i))
            .collect();
        let to_remove: Vec<Uuid> = stored
            .iter()
            .map(|i| i.id)
            .filter(|id| !sessions.iter().any(|s| s.id == *id))
            .collect();
        let instance_ids: Vec<Uuid> = sessions.iter().map(|i| i.id).collect();

        if to_write.is_empty() && to_remove.is_empty() && instance_ids == header.instance_ids {
            tracing::debug!(
                "Schedule {} already matches template {}",
                header.storage_key(),
                template.id
            );
            return Ok((header.into_schedule(sessions), changes));
        }

        let (rewrites, inserts): (Vec<&SessionInstance>, Vec<&SessionInstance>) = to_write
            .iter()
            .copied()
            .partition(|i| stored.iter().any(|s| s.id == i.id));
        self.ensure_unclaimed(inserts.iter().copied())?;

        header.instance_ids = instance_ids;
        header.updated_at = Utc::now();
        self.claim(&header, Expected::Version(version))?;

        for instance in &rewrites {
            self.store.save(*instance, Expected::Any)?;
        }
        for instance in &inserts {
            self.insert_instance(instance)?;
        }
        for id in &to_remove {
            self.store.delete(Collection::Instances, &id.to_string())?;
        }

        changes.written = to_write.len();
        changes.removed = to_remove.len();
        Ok((header.into_schedule(sessions), changes))
    }

    /// Write the schedule header, failing if another writer got there first.
    fn claim(&self, header: &ScheduleHeader, expected: Expected) -> Result<()> {
        match self.store.compare_and_save(header, expected)? {
            Ok(_) => Ok(()),
            Err(mismatch) => {
                tracing::warn!("Lost schedule materialization race: {}", mismatch);
                Err(ConflictError::ScheduleChanged {
                    template_id: header.template_id,
                    week_start_date: header.week_start_date,
                }
                .into())
            }
        }
    }

    /// Fail if any of `instances` is already stored, which means another schedule owns it.
    fn ensure_unclaimed<'a>(&self, instances: impl Iterator<Item = &'a SessionInstance>) -> Result<()> {
        for instance in instances {
            if self.instance(instance.id)?.is_some() {
                return Err(instance_taken(instance));
            }
        }
        Ok(())
    }

    fn insert_instance(&self, instance: &SessionInstance) -> Result<()> {
        match self.store.compare_and_save(instance, Expected::Absent)? {
            Ok(_) => Ok(()),
            Err(mismatch) => {
                tracing::warn!("Instance written concurrently: {}", mismatch);
                Err(instance_taken(instance))
            }
        }
    }

    fn load_instances(&self, header: &ScheduleHeader) -> Result<Vec<SessionInstance>> {
        header
            .instance_ids
            .iter()
            .map(|id| {
                self.instance(*id)?.ok_or_else(|| {
                    let err = IntegrityError::MissingScheduleInstance {
                        schedule_key: header.storage_key(),
                        session_instance_id: *id,
                    };
                    tracing::error!("{}", err);
                    Error::from(err)
                })
            })
            .collect()
    }

    fn assemble(&self, header: ScheduleHeader) -> Result<SessionSchedule> {
        let mut sessions = self.load_instances(&header)?;
        sort_sessions(&mut sessions);
        Ok(header.into_schedule(sessions))
    }
}

fn instance_taken(instance: &SessionInstance) -> Error {
    let err = ConflictError::InstanceTaken {
        session_instance_id: instance.id,
        template_id: instance.template_id,
        week_start_date: instance.week_start_date,
    };
    tracing::warn!("{}", err);
    err.into()
}

fn sort_sessions(sessions: &mut [SessionInstance]) {
    sessions.sort_by(|a, b| {
        a.chronological_key()
            .cmp(&b.chronological_key())
            .then(a.id.cmp(&b.id))
    });
}
