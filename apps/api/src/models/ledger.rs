use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::user::UserView;

/// One row per (seeker, provider). Both views of the pair read this row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct CompatibilityScore {
    pub seeker_id: i64,
    pub provider_id: i64,
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Like {
    pub liker_id: i64,
    pub liked_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Match {
    pub seeker_id: i64,
    pub provider_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Entry of the "who liked me" view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceivedLike {
    pub liker: UserView,
    pub created_at: DateTime<Utc>,
    pub score: Option<f64>,
    pub mutual: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AdminStats {
    pub providers: i64,
    pub seekers: i64,
    pub active_total: i64,
    pub active_seekers: i64,
    pub active_providers: i64,
    pub matches_total: i64,
    pub matches_recent: i64,
}
