//! Persistence boundary for users, answers, scores, likes, matches and browse cursors.
//!
//! `AppState` carries an `Arc<dyn MatchStore>`: `PgMatchStore` in deployments,
//! `MemoryStore` when no database is configured and in tests.
//!
//! Uniqueness is the store's job: `insert_like` and `ensure_match` report whether a
//! row was actually created, so concurrent callers can never both see `true` for
//! the same key.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::matching::aggregator::AcceptedAnswer;
use crate::models::ledger::{AdminStats, CompatibilityScore, Like, Match};
use crate::models::user::{NewUser, Role, TraitProfile, User};

pub use memory::MemoryStore;
pub use postgres::PgMatchStore;

/// Profile fields a user may edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub contact: Option<String>,
    pub about: Option<String>,
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError>;

    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn get_user_by_external(&self, external_id: i64) -> Result<Option<User>, AppError>;

    /// Returns `false` when the user does not exist.
    async fn update_profile(&self, id: i64, update: ProfileUpdate) -> Result<bool, AppError>;

    async fn touch_last_active(&self, id: i64) -> Result<(), AppError>;

    /// Returns `false` when the user does not exist.
    async fn set_blocked(&self, id: i64, blocked: bool) -> Result<bool, AppError>;

    /// Deletes the user and every row it owns. Returns `false` when absent.
    async fn delete_user(&self, id: i64) -> Result<bool, AppError>;

    /// Stores the profile, marks the test completed and replaces the answer set,
    /// all in one atomic step.
    async fn save_test_results(
        &self,
        id: i64,
        profile: &TraitProfile,
        answers: &[AcceptedAnswer],
    ) -> Result<(), AppError>;

    async fn list_answers(&self, id: i64) -> Result<Vec<AcceptedAnswer>, AppError>;

    /// All users of a role in registration order (earliest first).
    async fn list_users(&self, role: Role) -> Result<Vec<User>, AppError>;

    async fn upsert_score(
        &self,
        seeker_id: i64,
        provider_id: i64,
        score: f64,
    ) -> Result<(), AppError>;

    async fn get_score(
        &self,
        seeker_id: i64,
        provider_id: i64,
    ) -> Result<Option<CompatibilityScore>, AppError>;

    /// Duplicate-rejecting insert. `true` only when the row was created.
    async fn insert_like(&self, liker_id: i64, liked_id: i64) -> Result<bool, AppError>;

    async fn has_like(&self, liker_id: i64, liked_id: i64) -> Result<bool, AppError>;

    /// Idempotent insert. `true` only when the row was created.
    async fn ensure_match(&self, seeker_id: i64, provider_id: i64) -> Result<bool, AppError>;

    async fn get_match(&self, seeker_id: i64, provider_id: i64)
        -> Result<Option<Match>, AppError>;

    /// Providers with a completed questionnaire and a score row for this seeker,
    /// ordered by score descending, then registration ascending.
    async fn scored_providers(
        &self,
        seeker_id: i64,
        include_blocked: bool,
    ) -> Result<Vec<(User, f64)>, AppError>;

    async fn get_cursor(&self, seeker_id: i64) -> Result<Option<i64>, AppError>;

    async fn set_cursor(&self, seeker_id: i64, index: i64) -> Result<(), AppError>;

    /// Likes pointing at `user_id` with the liker, most recent first.
    async fn likes_received(&self, user_id: i64) -> Result<Vec<(User, Like)>, AppError>;

    async fn stats(&self, active_since: DateTime<Utc>) -> Result<AdminStats, AppError>;
}
