//! Attendance statistics, computed fresh from the ledger on every call.

use std::sync::Arc;

use chrono::NaiveDate;

use super::ledger::sort_most_recent_first;
use crate::error::{Error, IntegrityError, Result};
use crate::models::{
    AttendanceRecord, AttendanceStats, AttendanceStatus, RecentAttendance, SessionInstance,
};
use crate::store::{RecordStore, RecordStoreExt};

pub const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn RecordStore>,
    recent_limit: usize,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn RecordStore>, recent_limit: usize) -> Self {
        Self {
            store,
            recent_limit,
        }
    }

    /// Stats over every record for `athlete_id`, optionally ignoring records dated
    /// after `as_of`.
    ///
    /// A record pointing at an instance that no longer exists fails the whole
    /// computation with [`IntegrityError::DanglingInstance`].
    pub fn compute(&self, athlete_id: &str, as_of: Option<NaiveDate>) -> Result<AttendanceStats> {
        let mut records: Vec<AttendanceRecord> = self
            .store
            .find::<AttendanceRecord>(&[("athlete_id", athlete_id)])?
            .into_iter()
            .map(|v| v.record)
            .filter(|r| as_of.is_none_or(|day| r.date <= day))
            .collect();
        sort_most_recent_first(&mut records);

        // Every record must resolve before it is counted, not just the recent ones.
        let sessions = records
            .iter()
            .map(|record| resolve_instance(self.store.as_ref(), record))
            .collect::<Result<Vec<_>>>()?;
        let tally = Tally::of(&records);

        let recent_attendance = records
            .iter()
            .zip(sessions)
            .take(self.recent_limit)
            .map(|(record, session)| RecentAttendance {
                date: record.date,
                status: record.status,
                session,
            })
            .collect();

        tracing::debug!(
            "Stats for athlete {}: {} sessions, {:.2}% present",
            athlete_id,
            tally.total,
            tally.rate()
        );

        Ok(AttendanceStats {
            athlete_id: athlete_id.to_string(),
            total_sessions: tally.total,
            attended_sessions: tally.present,
            late_sessions: tally.late,
            missed_sessions: tally.absent,
            attendance_rate: tally.rate(),
            recent_attendance,
        })
    }
}

/// The instance a record points at. A missing one is an integrity fault.
pub(crate) fn resolve_instance(
    store: &dyn RecordStore,
    record: &AttendanceRecord,
) -> Result<SessionInstance> {
    store
        .load::<SessionInstance>(&record.session_instance_id.to_string())?
        .map(|v| v.record)
        .ok_or_else(|| {
            let err = IntegrityError::DanglingInstance {
                record_id: record.id,
                session_instance_id: record.session_instance_id,
            };
            tracing::error!("{}", err);
            Error::from(err)
        })
}

/// Status counts over a set of records.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub total: u32,
    pub present: u32,
    pub late: u32,
    pub absent: u32,
}

impl Tally {
    pub fn of(records: &[AttendanceRecord]) -> Self {
        records.iter().fold(Self::default(), |mut tally, record| {
            tally.total += 1;
            match record.status {
                AttendanceStatus::Present => tally.present += 1,
                AttendanceStatus::Late => tally.late += 1,
                AttendanceStatus::Absent => tally.absent += 1,
            }
            tally
        })
    }

    /// Percentage of records marked present. Zero when there are no records.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.present) / f64::from(self.total) * 100.0
    }
}
