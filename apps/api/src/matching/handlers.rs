use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::matching::browse::{browse, BrowseAction, BrowseCard};
use crate::matching::ledger::{
    get_match, like_and_notify, likes_received, rank_providers_for, LikeOutcome, RankedProvider,
};
use crate::matching::Visibility;
use crate::models::ledger::{Match, ReceivedLike};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LikeRequest {
    pub liker_id: i64,
    pub liked_id: i64,
}

#[derive(Serialize)]
pub struct BrowseResponse {
    /// `None` until at least one scored provider is available.
    pub card: Option<BrowseCard>,
}

/// GET /api/v1/seekers/:id/ranking
pub async fn handle_ranking(
    State(state): State<AppState>,
    Path(seeker_id): Path<i64>,
) -> Result<Json<Vec<RankedProvider>>, AppError> {
    let ranked = rank_providers_for(
        state.store.as_ref(),
        seeker_id,
        state.ranking_mode(),
        Visibility::HideBlocked,
    )
    .await?;
    Ok(Json(ranked))
}

/// GET /api/v1/seekers/:id/browse
pub async fn handle_browse_current(
    State(state): State<AppState>,
    Path(seeker_id): Path<i64>,
) -> Result<Json<BrowseResponse>, AppError> {
    browse_with(&state, seeker_id, BrowseAction::Current).await
}

/// POST /api/v1/seekers/:id/browse/:action
pub async fn handle_browse_action(
    State(state): State<AppState>,
    Path((seeker_id, action)): Path<(i64, String)>,
) -> Result<Json<BrowseResponse>, AppError> {
    let action: BrowseAction = action.parse()?;
    browse_with(&state, seeker_id, action).await
}

async fn browse_with(
    state: &AppState,
    seeker_id: i64,
    action: BrowseAction,
) -> Result<Json<BrowseResponse>, AppError> {
    let card = browse(
        state.store.as_ref(),
        state.notifier.as_ref(),
        seeker_id,
        action,
        state.ranking_mode(),
    )
    .await?;
    Ok(Json(BrowseResponse { card }))
}

/// POST /api/v1/likes
///
/// Also serves the provider's "like back" from the likes-received list.
pub async fn handle_like(
    State(state): State<AppState>,
    Json(req): Json<LikeRequest>,
) -> Result<Json<LikeOutcome>, AppError> {
    let outcome = like_and_notify(
        state.store.as_ref(),
        state.notifier.as_ref(),
        req.liker_id,
        req.liked_id,
    )
    .await?;
    Ok(Json(outcome))
}

/// GET /api/v1/users/:id/likes
pub async fn handle_likes_received(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<ReceivedLike>>, AppError> {
    Ok(Json(likes_received(state.store.as_ref(), user_id).await?))
}

/// GET /api/v1/matches/:seeker_id/:provider_id
pub async fn handle_get_match(
    State(state): State<AppState>,
    Path((seeker_id, provider_id)): Path<(i64, i64)>,
) -> Result<Json<Match>, AppError> {
    Ok(Json(
        get_match(state.store.as_ref(), seeker_id, provider_id).await?,
    ))
}
