// Profile reads, edits and account reset.

pub mod handlers;

use tracing::info;

use crate::conversation::session::SessionStore;
use crate::errors::AppError;
use crate::matching::ledger::require_user;
use crate::models::user::UserView;
use crate::store::{MatchStore, ProfileUpdate};

pub async fn get_user(store: &dyn MatchStore, id: i64) -> Result<UserView, AppError> {
    Ok(UserView::from(&require_user(store, id).await?))
}

/// Edits contact and/or about. A blank contact is rejected; the role and the
/// questionnaire result cannot be edited here.
pub async fn edit_profile(
    store: &dyn MatchStore,
    id: i64,
    update: ProfileUpdate,
) -> Result<UserView, AppError> {
    let update = ProfileUpdate {
        contact: update.contact.map(|c| c.trim().to_string()),
        about: update.about.map(|a| a.trim().to_string()),
    };
    if update.contact.as_deref() == Some("") {
        return Err(AppError::Validation("Contact must not be blank".to_string()));
    }
    if !store.update_profile(id, update).await? {
        return Err(AppError::NotFound(format!("User {id} not found")));
    }
    store.touch_last_active(id).await?;
    get_user(store, id).await
}

/// Deletes the user with every owned row and drops the conversation session, so
/// the next message starts registration from scratch.
pub async fn reset_account(
    store: &dyn MatchStore,
    sessions: &dyn SessionStore,
    id: i64,
) -> Result<(), AppError> {
    let user = require_user(store, id).await?;
    if !store.delete_user(id).await? {
        return Err(AppError::NotFound(format!("User {id} not found")));
    }
    sessions.clear(user.external_id).await?;
    info!(
        "event=account_reset user_id={id} external_id={} role={}",
        user.external_id, user.role
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::session::{MemorySessionStore, Session};
    use crate::matching::ledger::record_like;
    use crate::models::user::{NewUser, Role};
    use crate::store::MemoryStore;

    async fn register(store: &MemoryStore, external_id: i64, role: Role) -> i64 {
        store
            .create_user(NewUser {
                external_id,
                role,
                contact: Some("@old".to_string()),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_edit_profile_updates_given_fields_only() {
        let store = MemoryStore::new();
        let id = register(&store, 1, Role::Provider).await;

        let view = edit_profile(
            &store,
            id,
            ProfileUpdate {
                contact: None,
                about: Some(" Couples counselling ".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(view.contact.as_deref(), Some("@old"));
        assert_eq!(view.about.as_deref(), Some("Couples counselling"));
    }

    #[tokio::test]
    async fn test_edit_profile_rejects_blank_contact_and_unknown_user() {
        let store = MemoryStore::new();
        let id = register(&store, 1, Role::Seeker).await;
        let blank = ProfileUpdate {
            contact: Some("  ".to_string()),
            about: None,
        };
        assert!(matches!(
            edit_profile(&store, id, blank).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            edit_profile(&store, 99, ProfileUpdate::default()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_account_removes_user_likes_and_session() {
        let store = MemoryStore::new();
        let sessions = MemorySessionStore::new();
        let seeker = register(&store, 1, Role::Seeker).await;
        let provider = register(&store, 2, Role::Provider).await;
        record_like(&store, seeker, provider).await.unwrap();
        sessions.save(&Session::new(1)).await.unwrap();

        reset_account(&store, &sessions, seeker).await.unwrap();

        assert!(store.get_user(seeker).await.unwrap().is_none());
        assert!(store.likes_received(provider).await.unwrap().is_empty());
        assert!(sessions.load(1).await.unwrap().is_none());
        assert!(matches!(
            reset_account(&store, &sessions, seeker).await,
            Err(AppError::NotFound(_))
        ));
    }
}
