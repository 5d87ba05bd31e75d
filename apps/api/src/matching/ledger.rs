//! Match Ledger: likes, mutual-match detection, ranked providers and the browse cursor.
//!
//! Likes are append-only and unique per ordered pair. A Match row exists exactly when
//! both directions of a seeker/provider like exist, and is created once by whichever
//! like completes the pair.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::matching::{RankingMode, Visibility};
use crate::models::ledger::{Match, ReceivedLike};
use crate::models::user::{Role, User, UserView};
use crate::notify::{dispatch, MatchEvent, Notifier};
use crate::store::MatchStore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikeOutcome {
    /// `false` for a repeated like; nothing was written.
    pub is_new: bool,
    /// The pair is (now) a mutual match.
    pub mutual: bool,
    /// This call created the Match row.
    pub match_created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedProvider {
    pub provider: UserView,
    /// `None` when scoring is disabled.
    pub score: Option<f64>,
}

pub(crate) async fn require_user(store: &dyn MatchStore, id: i64) -> Result<User, AppError> {
    store
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))
}

/// (seeker, provider) ordering of two users of opposite roles.
fn pair_of<'a>(a: &'a User, b: &'a User) -> Result<(&'a User, &'a User), AppError> {
    match (a.role, b.role) {
        (Role::Seeker, Role::Provider) => Ok((a, b)),
        (Role::Provider, Role::Seeker) => Ok((b, a)),
        _ => Err(AppError::Validation(format!(
            "Users {} and {} are both {}s",
            a.id, b.id, a.role
        ))),
    }
}

pub async fn record_like(
    store: &dyn MatchStore,
    liker_id: i64,
    liked_id: i64,
) -> Result<LikeOutcome, AppError> {
    if liker_id == liked_id {
        return Err(AppError::Validation("Users cannot like themselves".to_string()));
    }
    let liker = require_user(store, liker_id).await?;
    let liked = require_user(store, liked_id).await?;
    let (seeker, provider) = pair_of(&liker, &liked)?;

    let is_new = store.insert_like(liker_id, liked_id).await?;
    info!("event=like_sent from_user={liker_id} to_user={liked_id} new={is_new}");

    // Runs for repeats too, so a match whose insert failed earlier is completed by
    // the retry. The like above is committed before this read, so of two racing
    // reciprocal likes at least the later one sees the other.
    let mutual = store.has_like(liked_id, liker_id).await?;
    let match_created = if mutual {
        store.ensure_match(seeker.id, provider.id).await?
    } else {
        false
    };
    if match_created {
        info!(
            "event=match_confirmed seeker_id={} provider_id={}",
            seeker.id, provider.id
        );
    }
    if is_new {
        store.touch_last_active(liker_id).await?;
    }

    Ok(LikeOutcome {
        is_new,
        mutual,
        match_created,
    })
}

/// Records the like and emits `LikeReceived` for a new like and `MutualMatch` for a
/// newly created match.
pub async fn like_and_notify(
    store: &dyn MatchStore,
    notifier: &dyn Notifier,
    liker_id: i64,
    liked_id: i64,
) -> Result<LikeOutcome, AppError> {
    let outcome = record_like(store, liker_id, liked_id).await?;

    if outcome.is_new {
        let score = pair_score(store, liker_id, liked_id).await?;
        dispatch(
            notifier,
            MatchEvent::LikeReceived {
                from: liker_id,
                to: liked_id,
                score,
            },
        )
        .await;
    }

    if outcome.match_created {
        let liker = require_user(store, liker_id).await?;
        let (seeker, provider) = if liker.role == Role::Seeker {
            (liker_id, liked_id)
        } else {
            (liked_id, liker_id)
        };
        dispatch(notifier, MatchEvent::MutualMatch { seeker, provider }).await;
    }
    Ok(outcome)
}

/// Score of the pair regardless of which side asks.
async fn pair_score(store: &dyn MatchStore, a: i64, b: i64) -> Result<Option<f64>, AppError> {
    if let Some(row) = store.get_score(a, b).await? {
        return Ok(Some(row.score));
    }
    Ok(store.get_score(b, a).await?.map(|row| row.score))
}

pub async fn get_match(
    store: &dyn MatchStore,
    seeker_id: i64,
    provider_id: i64,
) -> Result<Match, AppError> {
    store
        .get_match(seeker_id, provider_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No match between seeker {seeker_id} and provider {provider_id}"
            ))
        })
}

pub async fn rank_providers_for(
    store: &dyn MatchStore,
    seeker_id: i64,
    mode: RankingMode,
    visibility: Visibility,
) -> Result<Vec<RankedProvider>, AppError> {
    let seeker = require_user(store, seeker_id).await?;
    if seeker.role != Role::Seeker {
        return Err(AppError::Forbidden);
    }
    let include_blocked = visibility == Visibility::All;

    match mode {
        RankingMode::Scored => {
            if !seeker.test_completed {
                return Ok(Vec::new());
            }
            let ranked = store.scored_providers(seeker_id, include_blocked).await?;
            Ok(ranked
                .iter()
                .map(|(provider, score)| RankedProvider {
                    provider: provider.into(),
                    score: Some(*score),
                })
                .collect())
        }
        RankingMode::RegistrationOrder => {
            let providers = store.list_users(Role::Provider).await?;
            Ok(providers
                .iter()
                .filter(|p| include_blocked || !p.blocked)
                .map(|provider| RankedProvider {
                    provider: provider.into(),
                    score: None,
                })
                .collect())
        }
    }
}

pub async fn get_browse_cursor(store: &dyn MatchStore, seeker_id: i64) -> Result<usize, AppError> {
    Ok(store.get_cursor(seeker_id).await?.unwrap_or(0).max(0) as usize)
}

pub async fn set_browse_cursor(
    store: &dyn MatchStore,
    seeker_id: i64,
    index: usize,
) -> Result<(), AppError> {
    store.set_cursor(seeker_id, index as i64).await
}

pub async fn likes_received(
    store: &dyn MatchStore,
    user_id: i64,
) -> Result<Vec<ReceivedLike>, AppError> {
    require_user(store, user_id).await?;
    let rows = store.likes_received(user_id).await?;

    let mut received = Vec::with_capacity(rows.len());
    for (liker, like) in rows {
        let score = pair_score(store, liker.id, user_id).await?;
        let mutual = store.has_like(user_id, liker.id).await?;
        received.push(ReceivedLike {
            liker: UserView::from(&liker),
            created_at: like.created_at,
            score,
            mutual,
        });
    }
    Ok(received)
}
