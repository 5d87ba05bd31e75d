use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::user::UserView;
use crate::state::AppState;
use crate::store::ProfileUpdate;
use crate::users::{edit_profile, get_user, reset_account};

#[derive(Deserialize)]
pub struct ProfileEdit {
    pub contact: Option<String>,
    pub about: Option<String>,
}

/// GET /api/v1/users/:id
pub async fn handle_get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserView>, AppError> {
    Ok(Json(get_user(state.store.as_ref(), id).await?))
}

/// PATCH /api/v1/users/:id
pub async fn handle_edit_profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ProfileEdit>,
) -> Result<Json<UserView>, AppError> {
    let update = ProfileUpdate {
        contact: req.contact,
        about: req.about,
    };
    Ok(Json(edit_profile(state.store.as_ref(), id, update).await?))
}

/// DELETE /api/v1/users/:id
pub async fn handle_reset_account(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    reset_account(state.store.as_ref(), state.sessions.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
