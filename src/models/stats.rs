use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{AttendanceStatus, SessionInstance};

/// Attendance statistics for one athlete. Derived on every request and never stored.
///
/// `attended_sessions + late_sessions + missed_sessions == total_sessions` always holds,
/// and `attendance_rate` is the unrounded percentage of `present` records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceStats {
    pub athlete_id: String,
    pub total_sessions: u32,
    pub attended_sessions: u32,
    pub late_sessions: u32,
    pub missed_sessions: u32,
    pub attendance_rate: f64,
    /// Most recent records first, each with the session it belongs to.
    pub recent_attendance: Vec<RecentAttendance>,
}

impl AttendanceStats {
    /// The attendance rate rounded for display, e.g. `66.7%`.
    pub fn rate_label(&self) -> String {
        format!("{:.1}%", self.attendance_rate)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentAttendance {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub session: SessionInstance,
}

/// Query parameters for the stats endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsQuery {
    /// Only count records dated on or before this day.
    pub as_of: Option<NaiveDate>,
}
