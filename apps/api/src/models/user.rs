use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Seeker,
    Provider,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Seeker => "seeker",
            Role::Provider => "provider",
        }
    }

    pub fn opposite(&self) -> Role {
        match self {
            Role::Seeker => Role::Provider,
            Role::Provider => Role::Seeker,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seeker" => Ok(Role::Seeker),
            "provider" => Ok(Role::Provider),
            other => Err(AppError::Validation(format!("Unknown role '{other}'"))),
        }
    }
}

/// Aggregated questionnaire result.
///
/// `Traits` comes from the normalized-difference aggregator (trait name → [0,1]),
/// `Vector` from the weighted-vector aggregator. The two are never comparable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum TraitProfile {
    Traits(BTreeMap<String, f64>),
    Vector(Vec<f64>),
}

impl TraitProfile {
    pub fn kind(&self) -> &'static str {
        match self {
            TraitProfile::Traits(_) => "traits",
            TraitProfile::Vector(_) => "vector",
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TraitProfile::Traits(t) => t.is_empty(),
            TraitProfile::Vector(v) => v.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    /// Identity in the calling transport (chat id, account id).
    pub external_id: i64,
    pub role: Role,
    pub contact: Option<String>,
    pub about: Option<String>,
    pub test_completed: bool,
    pub trait_profile: Option<TraitProfile>,
    pub blocked: bool,
    pub registered_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl User {
    /// Profile usable for scoring, or `None` while the questionnaire is incomplete.
    pub fn completed_profile(&self) -> Option<&TraitProfile> {
        if self.test_completed {
            self.trait_profile.as_ref()
        } else {
            None
        }
    }
}

/// Public card shown to the opposite role. Never carries the trait profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserView {
    pub id: i64,
    pub role: Role,
    pub contact: Option<String>,
    pub about: Option<String>,
    pub test_completed: bool,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
            contact: user.contact.clone(),
            about: user.about.clone(),
            test_completed: user.test_completed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub external_id: i64,
    pub role: Role,
    pub contact: Option<String>,
}
