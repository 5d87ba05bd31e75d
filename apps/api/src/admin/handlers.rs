use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::admin::{admin_stats, authorize, set_blocked};
use crate::errors::AppError;
use crate::matching::ledger::{rank_providers_for, RankedProvider};
use crate::matching::Visibility;
use crate::models::ledger::AdminStats;
use crate::state::AppState;

/// GET /api/v1/admin/stats
pub async fn handle_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdminStats>, AppError> {
    let admin_id = authorize(&state.config.admin_allowlist, &headers)?;
    let stats = admin_stats(
        state.store.as_ref(),
        admin_id,
        state.config.active_window_hours,
    )
    .await?;
    Ok(Json(stats))
}

/// POST /api/v1/admin/users/:id/block
pub async fn handle_block(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let admin_id = authorize(&state.config.admin_allowlist, &headers)?;
    set_blocked(state.store.as_ref(), admin_id, user_id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/users/:id/unblock
pub async fn handle_unblock(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let admin_id = authorize(&state.config.admin_allowlist, &headers)?;
    set_blocked(state.store.as_ref(), admin_id, user_id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/seekers/:id/ranking
///
/// Same ranking the seeker sees, blocked providers included.
pub async fn handle_inspect_ranking(
    State(state): State<AppState>,
    Path(seeker_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Vec<RankedProvider>>, AppError> {
    authorize(&state.config.admin_allowlist, &headers)?;
    let ranked = rank_providers_for(
        state.store.as_ref(),
        seeker_id,
        state.ranking_mode(),
        Visibility::All,
    )
    .await?;
    Ok(Json(ranked))
}
