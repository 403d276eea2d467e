//! Calendar math: canonical week starts, day-of-week offsets and wall-clock session times.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The weekday every schedule week begins on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WeekStart {
    Sunday,
    #[default]
    Monday,
}

impl WeekStart {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sunday => "sunday",
            Self::Monday => "monday",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sunday" => Some(Self::Sunday),
            "monday" => Some(Self::Monday),
            _ => None,
        }
    }

    pub fn weekday(&self) -> Weekday {
        match self {
            Self::Sunday => Weekday::Sun,
            Self::Monday => Weekday::Mon,
        }
    }

    /// The canonical week start on or before `date`. `None` when that falls before
    /// the earliest representable date.
    pub fn week_of(&self, date: NaiveDate) -> Option<NaiveDate> {
        let back = (date.weekday().num_days_from_sunday() + 7
            - self.weekday().num_days_from_sunday())
            % 7;
        date.checked_sub_days(Days::new(u64::from(back)))
    }

    pub fn is_week_start(&self, date: NaiveDate) -> bool {
        date.weekday() == self.weekday()
    }

    /// Days between the week start and `day_of_week` (0 = Sunday .. 6 = Saturday).
    pub fn offset_of(&self, day_of_week: u8) -> u64 {
        let start = i64::from(self.weekday().num_days_from_sunday());
        (i64::from(day_of_week) - start).rem_euclid(7) as u64
    }

    /// The calendar date a blueprint on `day_of_week` falls on during the week beginning
    /// at `week_start`, if it is representable.
    pub fn date_in_week(&self, week_start: NaiveDate, day_of_week: u8) -> Option<NaiveDate> {
        week_start.checked_add_days(Days::new(self.offset_of(day_of_week)))
    }
}

impl fmt::Display for WeekStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock time of day for a session, written as `H:MM` or `HH:MM` (24h).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionTime(NaiveTime);

impl SessionTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (hour, minute) = s.split_once(':')?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return None;
        }
        if !hour.bytes().chain(minute.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        let hour: u32 = hour.parse().ok()?;
        let minute: u32 = minute.parse().ok()?;
        if hour > 23 || minute > 59 {
            return None;
        }
        Self::new(hour, minute)
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for SessionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for SessionTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid time '{s}', expected HH:MM"))
    }
}

impl Serialize for SessionTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
