//! Runtime configuration, loaded from environment variables.
//!
//! | Variable                 | Meaning                                            |
//! |--------------------------|----------------------------------------------------|
//! | `ROLLCALL_DB_PATH`       | SQLite file (default: platform data dir)           |
//! | `ROLLCALL_PORT`          | HTTP port (default 3000)                           |
//! | `ROLLCALL_WEEK_START`    | `monday` (default) or `sunday`                     |
//! | `ROLLCALL_RECENT_LIMIT`  | Records returned in `recent_attendance` (default 10) |
//! | `ROLLCALL_ROSTER_FILE`   | JSON roster assignments; without it every athlete is visible |
//! | `ROLLCALL_CORS_ORIGINS`  | Comma-separated allowed origins; permissive when unset |
//!
//! CLI flags override the environment.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::calendar::WeekStart;
use crate::roster::{OpenRoster, RosterGate, StaticRoster};
use crate::scheduling::{SchedulingSettings, DEFAULT_RECENT_LIMIT};

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// `None` means the platform default from [`Database::default_path`](crate::db::Database::default_path).
    pub db_path: Option<PathBuf>,
    pub port: u16,
    pub week_start: WeekStart,
    pub recent_limit: usize,
    pub roster_file: Option<PathBuf>,
    pub cors_origins: Option<Vec<String>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            port: DEFAULT_PORT,
            week_start: WeekStart::default(),
            recent_limit: DEFAULT_RECENT_LIMIT,
            roster_file: None,
            cors_origins: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = match var("ROLLCALL_PORT") {
            Some(p) => p
                .parse()
                .with_context(|| format!("ROLLCALL_PORT must be a port number, got '{}'", p))?,
            None => defaults.port,
        };

        let week_start = match var("ROLLCALL_WEEK_START") {
            Some(w) => WeekStart::from_str(&w.to_lowercase()).with_context(|| {
                format!("ROLLCALL_WEEK_START must be 'monday' or 'sunday', got '{}'", w)
            })?,
            None => defaults.week_start,
        };

        let recent_limit = match var("ROLLCALL_RECENT_LIMIT") {
            Some(n) => n.parse().with_context(|| {
                format!("ROLLCALL_RECENT_LIMIT must be a non-negative integer, got '{}'", n)
            })?,
            None => defaults.recent_limit,
        };

        let cors_origins = var("ROLLCALL_CORS_ORIGINS").map(|s| {
            s.split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect()
        });

        Ok(Self {
            db_path: var("ROLLCALL_DB_PATH").map(PathBuf::from),
            port,
            week_start,
            recent_limit,
            roster_file: var("ROLLCALL_ROSTER_FILE").map(PathBuf::from),
            cors_origins,
        })
    }

    pub fn scheduling(&self) -> SchedulingSettings {
        SchedulingSettings {
            week_start: self.week_start,
            recent_limit: self.recent_limit,
        }
    }

    pub fn build_roster(&self) -> Result<Arc<dyn RosterGate>> {
        match &self.roster_file {
            Some(path) => Ok(Arc::new(StaticRoster::from_file(path)?)),
            None => {
                tracing::warn!("No roster file configured; every athlete is visible to every user");
                Ok(Arc::new(OpenRoster))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.week_start, WeekStart::Monday);
        assert_eq!(config.recent_limit, 10);
    }

    #[test]
    fn reads_every_variable() {
        let config = AppConfig::from_lookup(lookup(&[
            ("ROLLCALL_DB_PATH", "/tmp/rollcall.db"),
            ("ROLLCALL_PORT", "8080"),
            ("ROLLCALL_WEEK_START", "Sunday"),
            ("ROLLCALL_RECENT_LIMIT", "5"),
            ("ROLLCALL_ROSTER_FILE", "/etc/rollcall/roster.json"),
            ("ROLLCALL_CORS_ORIGINS", "https://a.example, https://b.example,"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/rollcall.db")));
        assert_eq!(config.port, 8080);
        assert_eq!(config.week_start, WeekStart::Sunday);
        assert_eq!(config.recent_limit, 5);
        assert_eq!(
            config.cors_origins,
            Some(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
    }

    #[test]
    fn rejects_unknown_week_start() {
        let err = AppConfig::from_lookup(lookup(&[("ROLLCALL_WEEK_START", "friday")])).unwrap_err();
        assert!(err.to_string().contains("ROLLCALL_WEEK_START"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("ROLLCALL_PORT", "  ")])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
    }
}
