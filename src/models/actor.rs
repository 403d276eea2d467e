use serde::{Deserialize, Serialize};

/// The role a caller acts under. Resolved externally; only used to ask the
/// [`RosterGate`](crate::roster::RosterGate) which athletes the caller can see.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    LeadCoach,
    AcademyCoach,
    FitnessTrainer,
    Player,
    Parent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::LeadCoach => "lead_coach",
            Self::AcademyCoach => "academy_coach",
            Self::FitnessTrainer => "fitness_trainer",
            Self::Player => "player",
            Self::Parent => "parent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "lead_coach" => Some(Self::LeadCoach),
            "academy_coach" => Some(Self::AcademyCoach),
            "fitness_trainer" => Some(Self::FitnessTrainer),
            "player" => Some(Self::Player),
            "parent" => Some(Self::Parent),
            _ => None,
        }
    }

    /// Roles that see every athlete regardless of assignments.
    pub fn sees_all_athletes(&self) -> bool {
        matches!(self, Self::Admin | Self::LeadCoach)
    }
}

/// Who is performing a write. Every template, schedule and attendance write
/// records the actor's `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}
