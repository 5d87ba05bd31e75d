//! Administration: allow-list check, population/match statistics and the block flag.
//!
//! Admins identify themselves with the `x-admin-id` header. Nothing else is
//! authenticated; the allow-list comes from `ADMIN_ALLOWLIST`.

pub mod handlers;

use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::ledger::AdminStats;
use crate::store::MatchStore;

pub const ADMIN_HEADER: &str = "x-admin-id";

/// Returns the admin id when the header names an allow-listed user.
pub fn authorize(allowlist: &[i64], headers: &HeaderMap) -> Result<i64, AppError> {
    let admin_id = headers
        .get(ADMIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok());

    match admin_id {
        Some(id) if allowlist.contains(&id) => Ok(id),
        other => {
            warn!("Rejected admin request from {other:?}");
            Err(AppError::Forbidden)
        }
    }
}

pub async fn admin_stats(
    store: &dyn MatchStore,
    admin_id: i64,
    window_hours: i64,
) -> Result<AdminStats, AppError> {
    let since = Utc::now() - Duration::hours(window_hours);
    let stats = store.stats(since).await?;
    info!("event=admin_stats_viewed admin_id={admin_id} window_hours={window_hours}");
    Ok(stats)
}

pub async fn set_blocked(
    store: &dyn MatchStore,
    admin_id: i64,
    user_id: i64,
    blocked: bool,
) -> Result<(), AppError> {
    if !store.set_blocked(user_id, blocked).await? {
        return Err(AppError::NotFound(format!("User {user_id} not found")));
    }
    info!("event=user_block_changed admin_id={admin_id} user_id={user_id} blocked={blocked}");
    Ok(())
}
