//! The attendance ledger: upserts keyed by `(session instance, athlete, date)`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::materializer::KeyedLocks;
use crate::error::{ConflictError, Error, Result, ValidationError};
use crate::models::{
    Actor, AttendanceFilter, AttendanceRecord, RecordAttendanceInput, SessionInstance,
    SessionSchedule, SessionSheet, SheetEntry,
};
use crate::roster::AthleteScope;
use crate::store::{Expected, RecordStore, RecordStoreExt, Versioned};

/// Version-check retries before giving up on a hot key.
const MAX_WRITE_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct AttendanceLedger {
    store: Arc<dyn RecordStore>,
    locks: Arc<KeyedLocks>,
}

impl AttendanceLedger {
    /// `locks` must be the table the materializer uses, so that a write and a
    /// re-materialization of the same week never interleave.
    pub fn new(store: Arc<dyn RecordStore>, locks: Arc<KeyedLocks>) -> Self {
        Self { store, locks }
    }

    /// Create or overwrite the record for `(session, athlete, date)`.
    ///
    /// Concurrent writers to the same key are ordered by their write time: whichever
    /// wrote later wins, and a writer that finds a newer record already stored gets
    /// [`ConflictError::ConcurrentUpdate`] back instead of overwriting it.
    pub fn record(
        &self,
        actor: &Actor,
        scope: &AthleteScope,
        input: RecordAttendanceInput,
    ) -> Result<AttendanceRecord> {
        let instance = self.require_instance(input.session_instance_id)?;
        let lock = self.locks.lock_for(&SessionSchedule::storage_key(
            instance.template_id,
            instance.week_start_date,
        ));
        let _guard = lock.lock().expect("materialization lock poisoned");
        // Re-read: the week may have been re-materialized while we waited.
        let instance = self.require_instance(input.session_instance_id)?;

        let athlete_id = input.athlete_id.trim().to_string();
        if athlete_id.is_empty() {
            return Err(ValidationError::TooShort {
                field: "athlete_id",
                min: 1,
            }
            .into());
        }
        if input.date != instance.date {
            return Err(ValidationError::DateMismatch {
                session_instance_id: instance.id,
                expected: instance.date,
                given: input.date,
            }
            .into());
        }
        if !scope.permits(&athlete_id) {
            tracing::warn!(
                "User {} tried to record attendance for athlete {} outside their roster",
                actor.user_id,
                athlete_id
            );
            return Err(Error::AthleteNotVisible {
                athlete_id,
                user_id: actor.user_id.clone(),
            });
        }

        let notes = input
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let attempted_at = Utc::now();
        let key = AttendanceRecord::storage_key(instance.id, &athlete_id, input.date);

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let existing = self.store.load::<AttendanceRecord>(&key)?;

            let (record, expected) = match existing {
                None => (
                    AttendanceRecord {
                        id: Uuid::new_v4(),
                        session_instance_id: instance.id,
                        athlete_id: athlete_id.clone(),
                        date: input.date,
                        status: input.status,
                        notes: notes.clone(),
                        recorded_by: actor.user_id.clone(),
                        created_at: attempted_at,
                        updated_at: attempted_at,
                    },
                    Expected::Absent,
                ),
                Some(Versioned { version, record }) => {
                    let stale_since = input.expected_updated_at.unwrap_or(attempted_at);
                    if record.updated_at > stale_since || record.updated_at > attempted_at {
                        return Err(concurrent_update(&record, attempted_at));
                    }
                    (
                        AttendanceRecord {
                            status: input.status,
                            notes: notes.clone(),
                            recorded_by: actor.user_id.clone(),
                            updated_at: attempted_at,
                            ..record
                        },
                        Expected::Version(version),
                    )
                }
            };

            match self.store.compare_and_save(&record, expected)? {
                Ok(_) => {
                    tracing::info!(
                        "Recorded {} for athlete {} in session {} on {} (by {})",
                        record.status.as_str(),
                        record.athlete_id,
                        record.session_instance_id,
                        record.date,
                        record.recorded_by
                    );
                    return Ok(record);
                }
                Err(mismatch) => {
                    tracing::debug!("Retrying attendance write after {}", mismatch);
                }
            }
        }

        let latest = self
            .store
            .load::<AttendanceRecord>(&key)?
            .map(|v| v.record)
            .ok_or_else(|| Error::not_found("attendance record", &key))?;
        Err(concurrent_update(&latest, attempted_at))
    }

    fn require_instance(&self, id: Uuid) -> Result<SessionInstance> {
        self.store
            .load::<SessionInstance>(&id.to_string())?
            .map(|v| v.record)
            .ok_or(Error::UnknownSessionInstance(id))
    }

    /// Records matching every set field of `filter`, most recent first.
    pub fn find(&self, filter: &AttendanceFilter) -> Result<Vec<AttendanceRecord>> {
        let instance = filter.session_instance_id.map(|id| id.to_string());
        let date = filter.date.map(|d| d.to_string());

        let mut filters: Vec<(&str, &str)> = Vec::new();
        if let Some(instance) = &instance {
            filters.push(("session_instance_id", instance.as_str()));
        }
        if let Some(athlete_id) = &filter.athlete_id {
            filters.push(("athlete_id", athlete_id.as_str()));
        }
        if let Some(date) = &date {
            filters.push(("date", date.as_str()));
        }

        let mut records: Vec<AttendanceRecord> = self
            .store
            .find::<AttendanceRecord>(&filters)?
            .into_iter()
            .map(|v| v.record)
            .filter(|r| filter.matches(r))
            .collect();
        sort_most_recent_first(&mut records);
        Ok(records)
    }

    /// The session's snapshot roster alongside what has been recorded for it.
    pub fn sheet(&self, instance: SessionInstance) -> Result<SessionSheet> {
        let records = self.find(&AttendanceFilter::for_instance(instance.id))?;

        let mut entries: Vec<SheetEntry> = instance
            .athlete_ids
            .iter()
            .map(|athlete_id| {
                let record = records.iter().find(|r| &r.athlete_id == athlete_id);
                SheetEntry {
                    athlete_id: athlete_id.clone(),
                    rostered: true,
                    status: record.map(|r| r.status),
                    notes: record.and_then(|r| r.notes.clone()),
                    updated_at: record.map(|r| r.updated_at),
                }
            })
            .collect();

        let mut walk_ins: Vec<SheetEntry> = records
            .iter()
            .filter(|r| !instance.athlete_ids.contains(&r.athlete_id))
            .map(|r| SheetEntry {
                athlete_id: r.athlete_id.clone(),
                rostered: false,
                status: Some(r.status),
                notes: r.notes.clone(),
                updated_at: Some(r.updated_at),
            })
            .collect();
        walk_ins.sort_by(|a, b| a.athlete_id.cmp(&b.athlete_id));
        entries.extend(walk_ins);

        Ok(SessionSheet {
            session: instance,
            entries,
        })
    }
}

/// Date descending, then last write descending, then athlete.
pub fn sort_most_recent_first(records: &mut [AttendanceRecord]) {
    records.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then(b.updated_at.cmp(&a.updated_at))
            .then(a.athlete_id.cmp(&b.athlete_id))
    });
}

fn concurrent_update(stored: &AttendanceRecord, attempted_at: DateTime<Utc>) -> Error {
    let err = ConflictError::ConcurrentUpdate {
        session_instance_id: stored.session_instance_id,
        athlete_id: stored.athlete_id.clone(),
        date: stored.date,
        stored_updated_at: stored.updated_at,
        attempted_at,
    };
    tracing::warn!("{}", err);
    err.into()
}
