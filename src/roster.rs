//! Athlete visibility. Who may see which athletes is decided outside this crate; the
//! scheduling core only asks, through [`RosterGate`], before assigning or recording.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{AthleteId, Role};

/// The athletes a caller may act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AthleteScope {
    All,
    Only(BTreeSet<AthleteId>),
}

impl AthleteScope {
    pub fn permits(&self, athlete_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(athlete_id),
        }
    }
}

pub trait RosterGate: Send + Sync {
    fn resolve_visible_athletes(&self, role: Role, user_id: &str) -> Result<AthleteScope>;
}

/// Lets every caller act on every athlete.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenRoster;

impl RosterGate for OpenRoster {
    fn resolve_visible_athletes(&self, _role: Role, _user_id: &str) -> Result<AthleteScope> {
        Ok(AthleteScope::All)
    }
}

/// Fixed user-to-athlete assignments. Admins and lead coaches see everyone; any other
/// caller sees only the athletes assigned to them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticRoster {
    #[serde(default)]
    assignments: HashMap<String, BTreeSet<AthleteId>>,
}

impl StaticRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(mut self, user_id: impl Into<String>, athlete_id: impl Into<AthleteId>) -> Self {
        self.assignments
            .entry(user_id.into())
            .or_default()
            .insert(athlete_id.into());
        self
    }

    /// Load assignments from a JSON file of the form
    /// `{"assignments": {"<user id>": ["<athlete id>", ...]}}`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read roster file {}", path.display()))?;
        let roster: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse roster file {}", path.display()))?;
        tracing::info!(
            "Loaded roster assignments for {} users from {}",
            roster.assignments.len(),
            path.display()
        );
        Ok(roster)
    }
}

impl RosterGate for StaticRoster {
    fn resolve_visible_athletes(&self, role: Role, user_id: &str) -> Result<AthleteScope> {
        if role.sees_all_athletes() {
            return Ok(AthleteScope::All);
        }
        Ok(AthleteScope::Only(
            self.assignments.get(user_id).cloned().unwrap_or_default(),
        ))
    }
}
