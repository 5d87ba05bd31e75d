//! Swipe-style browsing over a seeker's ranked provider list.
//!
//! The persisted cursor is clamped here, not in the ledger: a cursor past the end of
//! the current list restarts at 0, `Next` from the last card wraps to the first and
//! `Prev` from the first wraps to the last.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::matching::ledger::{
    get_browse_cursor, like_and_notify, rank_providers_for, set_browse_cursor, LikeOutcome,
};
use crate::matching::{RankingMode, Visibility};
use crate::models::user::UserView;
use crate::notify::Notifier;
use crate::store::MatchStore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BrowseAction {
    Current,
    Next,
    Prev,
    Like,
}

impl FromStr for BrowseAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current" => Ok(BrowseAction::Current),
            "next" => Ok(BrowseAction::Next),
            "prev" => Ok(BrowseAction::Prev),
            "like" => Ok(BrowseAction::Like),
            other => Err(AppError::Validation(format!(
                "Unknown browse action '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowseCard {
    pub index: usize,
    pub total: usize,
    pub provider: UserView,
    pub score: Option<f64>,
    /// Present when the action was `Like`.
    pub like: Option<LikeOutcome>,
}

/// Index after applying a navigation action to a list of `len > 0` cards.
pub fn step(index: usize, len: usize, action: BrowseAction) -> usize {
    let index = if index >= len { 0 } else { index };
    match action {
        BrowseAction::Next => (index + 1) % len,
        BrowseAction::Prev => (index + len - 1) % len,
        BrowseAction::Current | BrowseAction::Like => index,
    }
}

/// Applies `action` for the seeker and returns the card under the cursor, or
/// `None` when there is nothing to show yet.
pub async fn browse(
    store: &dyn MatchStore,
    notifier: &dyn Notifier,
    seeker_id: i64,
    action: BrowseAction,
    mode: RankingMode,
) -> Result<Option<BrowseCard>, AppError> {
    let ranked = rank_providers_for(store, seeker_id, mode, Visibility::HideBlocked).await?;
    if ranked.is_empty() {
        return Ok(None);
    }

    let stored = get_browse_cursor(store, seeker_id).await?;
    let index = step(stored, ranked.len(), action);
    let current = &ranked[index];

    let like = if action == BrowseAction::Like {
        Some(like_and_notify(store, notifier, seeker_id, current.provider.id).await?)
    } else {
        None
    };

    set_browse_cursor(store, seeker_id, index).await?;
    store.touch_last_active(seeker_id).await?;
    info!(
        "event=card_shown seeker_id={seeker_id} provider_id={} position={index} total={}",
        current.provider.id,
        ranked.len()
    );

    Ok(Some(BrowseCard {
        index,
        total: ranked.len(),
        provider: current.provider.clone(),
        score: current.score,
        like,
    }))
}
