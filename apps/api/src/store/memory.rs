use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::errors::AppError;
use crate::matching::aggregator::AcceptedAnswer;
use crate::models::ledger::{AdminStats, CompatibilityScore, Like, Match};
use crate::models::user::{NewUser, Role, TraitProfile, User};
use crate::store::{MatchStore, ProfileUpdate};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    users: BTreeMap<i64, User>,
    answers: HashMap<i64, Vec<AcceptedAnswer>>,
    scores: HashMap<(i64, i64), CompatibilityScore>,
    /// Insertion order doubles as the recency tie-breaker.
    likes: Vec<Like>,
    matches: HashMap<(i64, i64), Match>,
    cursors: HashMap<i64, i64>,
}

impl MemoryState {
    fn require_user(&self, id: i64) -> Result<&User, AppError> {
        self.users
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))
    }
}

/// In-process store. A single lock serializes every write path, which gives the
/// same at-most-once guarantees as the unique keys in Postgres.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn registration_order(a: &User, b: &User) -> std::cmp::Ordering {
    a.registered_at
        .cmp(&b.registered_at)
        .then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut state = self.state.lock().await;
        if state
            .users
            .values()
            .any(|u| u.external_id == new_user.external_id)
        {
            return Err(AppError::Validation(format!(
                "External id {} is already registered",
                new_user.external_id
            )));
        }
        state.next_id += 1;
        let now = Utc::now();
        let user = User {
            id: state.next_id,
            external_id: new_user.external_id,
            role: new_user.role,
            contact: new_user.contact,
            about: None,
            test_completed: false,
            trait_profile: None,
            blocked: false,
            registered_at: now,
            last_active_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn get_user_by_external(&self, external_id: i64) -> Result<Option<User>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn update_profile(&self, id: i64, update: ProfileUpdate) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(false);
        };
        if let Some(contact) = update.contact {
            user.contact = Some(contact);
        }
        if let Some(about) = update.about {
            user.about = Some(about);
        }
        user.last_active_at = Utc::now();
        Ok(true)
    }

    async fn touch_last_active(&self, id: i64) -> Result<(), AppError> {
        if let Some(user) = self.state.lock().await.users.get_mut(&id) {
            user.last_active_at = Utc::now();
        }
        Ok(())
    }

    async fn set_blocked(&self, id: i64, blocked: bool) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&id) {
            Some(user) => {
                user.blocked = blocked;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        if state.users.remove(&id).is_none() {
            return Ok(false);
        }
        state.answers.remove(&id);
        state
            .scores
            .retain(|(seeker, provider), _| *seeker != id && *provider != id);
        state
            .likes
            .retain(|like| like.liker_id != id && like.liked_id != id);
        state
            .matches
            .retain(|(seeker, provider), _| *seeker != id && *provider != id);
        state.cursors.remove(&id);
        Ok(true)
    }

    async fn save_test_results(
        &self,
        id: i64,
        profile: &TraitProfile,
        answers: &[AcceptedAnswer],
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))?;
        user.trait_profile = Some(profile.clone());
        user.test_completed = true;
        user.last_active_at = Utc::now();
        state.answers.insert(id, answers.to_vec());
        Ok(())
    }

    async fn list_answers(&self, id: i64) -> Result<Vec<AcceptedAnswer>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .answers
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_users(&self, role: Role) -> Result<Vec<User>, AppError> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| u.role == role)
            .cloned()
            .collect();
        users.sort_by(registration_order);
        Ok(users)
    }

    async fn upsert_score(
        &self,
        seeker_id: i64,
        provider_id: i64,
        score: f64,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        state.require_user(seeker_id)?;
        state.require_user(provider_id)?;
        state.scores.insert(
            (seeker_id, provider_id),
            CompatibilityScore {
                seeker_id,
                provider_id,
                score,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_score(
        &self,
        seeker_id: i64,
        provider_id: i64,
    ) -> Result<Option<CompatibilityScore>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .scores
            .get(&(seeker_id, provider_id))
            .cloned())
    }

    async fn insert_like(&self, liker_id: i64, liked_id: i64) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        state.require_user(liker_id)?;
        state.require_user(liked_id)?;
        if state
            .likes
            .iter()
            .any(|l| l.liker_id == liker_id && l.liked_id == liked_id)
        {
            return Ok(false);
        }
        state.likes.push(Like {
            liker_id,
            liked_id,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn has_like(&self, liker_id: i64, liked_id: i64) -> Result<bool, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .likes
            .iter()
            .any(|l| l.liker_id == liker_id && l.liked_id == liked_id))
    }

    async fn ensure_match(&self, seeker_id: i64, provider_id: i64) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        state.require_user(seeker_id)?;
        state.require_user(provider_id)?;
        if state.matches.contains_key(&(seeker_id, provider_id)) {
            return Ok(false);
        }
        state.matches.insert(
            (seeker_id, provider_id),
            Match {
                seeker_id,
                provider_id,
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn get_match(
        &self,
        seeker_id: i64,
        provider_id: i64,
    ) -> Result<Option<Match>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .matches
            .get(&(seeker_id, provider_id))
            .cloned())
    }

    async fn scored_providers(
        &self,
        seeker_id: i64,
        include_blocked: bool,
    ) -> Result<Vec<(User, f64)>, AppError> {
        let state = self.state.lock().await;
        let mut ranked: Vec<(User, f64)> = state
            .scores
            .values()
            .filter(|s| s.seeker_id == seeker_id)
            .filter_map(|s| {
                let provider = state.users.get(&s.provider_id)?;
                let eligible = provider.role == Role::Provider
                    && provider.test_completed
                    && (include_blocked || !provider.blocked);
                eligible.then(|| (provider.clone(), s.score))
            })
            .collect();
        ranked.sort_by(|(a, a_score), (b, b_score)| {
            b_score
                .total_cmp(a_score)
                .then_with(|| registration_order(a, b))
        });
        Ok(ranked)
    }

    async fn get_cursor(&self, seeker_id: i64) -> Result<Option<i64>, AppError> {
        Ok(self.state.lock().await.cursors.get(&seeker_id).copied())
    }

    async fn set_cursor(&self, seeker_id: i64, index: i64) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        state.require_user(seeker_id)?;
        state.cursors.insert(seeker_id, index.max(0));
        Ok(())
    }

    async fn likes_received(&self, user_id: i64) -> Result<Vec<(User, Like)>, AppError> {
        let state = self.state.lock().await;
        let mut received: Vec<(User, Like)> = state
            .likes
            .iter()
            .rev()
            .filter(|l| l.liked_id == user_id)
            .filter_map(|l| state.users.get(&l.liker_id).map(|u| (u.clone(), l.clone())))
            .collect();
        // Stable sort keeps the reverse-insertion order for equal timestamps.
        received.sort_by(|(_, a), (_, b)| b.created_at.cmp(&a.created_at));
        Ok(received)
    }

    async fn stats(&self, active_since: DateTime<Utc>) -> Result<AdminStats, AppError> {
        let state = self.state.lock().await;
        let mut stats = AdminStats::default();
        for user in state.users.values() {
            let active = user.last_active_at >= active_since;
            match user.role {
                Role::Provider => {
                    stats.providers += 1;
                    if active {
                        stats.active_providers += 1;
                    }
                }
                Role::Seeker => {
                    stats.seekers += 1;
                    if active {
                        stats.active_seekers += 1;
                    }
                }
            }
        }
        stats.active_total = stats.active_providers + stats.active_seekers;
        stats.matches_total = state.matches.len() as i64;
        stats.matches_recent = state
            .matches
            .values()
            .filter(|m| m.created_at >= active_since)
            .count() as i64;
        Ok(stats)
    }
}
