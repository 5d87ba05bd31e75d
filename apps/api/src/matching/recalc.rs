//! Score recalculation: on test completion, rescore the user against every
//! completed member of the opposite role and upsert the (seeker, provider) rows.
//!
//! Existing Match rows are never revisited; only scores change.

use tracing::{info, warn};

use crate::errors::AppError;
use crate::matching::ledger::require_user;
use crate::matching::scorer::CompatibilityScorer;
use crate::models::user::Role;
use crate::store::MatchStore;

/// Returns the number of score rows written. A user without a completed
/// questionnaire gets no rows.
pub async fn recalc_for(
    store: &dyn MatchStore,
    scorer: &dyn CompatibilityScorer,
    user_id: i64,
) -> Result<usize, AppError> {
    let user = require_user(store, user_id).await?;
    let Some(profile) = user.completed_profile() else {
        info!("Skipping recalculation for user {user_id}: questionnaire incomplete");
        return Ok(0);
    };

    let peers = store.list_users(user.role.opposite()).await?;
    let mut written = 0;

    for peer in &peers {
        let Some(peer_profile) = peer.completed_profile() else {
            continue;
        };
        let (seeker_id, provider_id, seeker_profile, provider_profile) = match user.role {
            Role::Seeker => (user.id, peer.id, profile, peer_profile),
            Role::Provider => (peer.id, user.id, peer_profile, profile),
        };
        let score = match scorer.score(seeker_profile, provider_profile) {
            Ok(score) => score,
            Err(AppError::StrategyMismatch(msg)) => {
                warn!("Skipping pair ({seeker_id}, {provider_id}): {msg}");
                continue;
            }
            Err(e) => return Err(e),
        };
        store.upsert_score(seeker_id, provider_id, score).await?;
        written += 1;
    }

    info!(
        "event=scores_recalculated user_id={user_id} role={} peers={} written={written} strategy={}",
        user.role,
        peers.len(),
        scorer.strategy()
    );
    Ok(written)
}
