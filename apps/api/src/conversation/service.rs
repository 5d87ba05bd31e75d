use anyhow::anyhow;
use chrono::Utc;
use tracing::{debug, info};

use crate::conversation::session::{Session, SessionStore};
use crate::conversation::{apply, ConversationEvent, ConversationState, Effect};
use crate::errors::AppError;
use crate::matching::aggregator::aggregate;
use crate::matching::ledger::require_user;
use crate::matching::recalc::recalc_for;
use crate::matching::scorer::CompatibilityScorer;
use crate::models::user::{NewUser, Role};
use crate::questionnaire::Questionnaire;
use crate::state::AppState;
use crate::store::{MatchStore, ProfileUpdate};

/// Collaborators one conversation step needs.
pub struct Conversation<'a> {
    pub store: &'a dyn MatchStore,
    pub sessions: &'a dyn SessionStore,
    pub scorer: &'a dyn CompatibilityScorer,
    pub questionnaire: &'a Questionnaire,
}

impl<'a> Conversation<'a> {
    pub fn from_state(state: &'a AppState) -> Self {
        Self {
            store: state.store.as_ref(),
            sessions: state.sessions.as_ref(),
            scorer: state.scorer.as_ref(),
            questionnaire: state.questionnaire.as_ref(),
        }
    }

    /// Current session for a transport user. A registered user whose session has
    /// expired resumes at `TestComplete` or `ProfileComplete`; the resumed session
    /// is stored by the next event, not here.
    pub async fn session(&self, external_id: i64) -> Result<Session, AppError> {
        if let Some(session) = self.sessions.load(external_id).await? {
            return Ok(session);
        }

        let Some(user) = self.store.get_user_by_external(external_id).await? else {
            return Ok(Session::new(external_id));
        };
        let state = if user.test_completed {
            ConversationState::TestComplete
        } else {
            ConversationState::ProfileComplete
        };
        info!(
            "Resuming user {} (external {external_id}) in state {}",
            user.id,
            state.name()
        );
        Ok(Session {
            external_id,
            user_id: Some(user.id),
            user_role: Some(user.role),
            state,
            updated_at: Utc::now(),
        })
    }

    /// Applies one event. Events for the same external id run one at a time.
    pub async fn handle_event(
        &self,
        external_id: i64,
        event: ConversationEvent,
    ) -> Result<Session, AppError> {
        let _lock = self.sessions.lock(external_id).await?;
        let mut session = self.session(external_id).await?;
        let role = self.role_of(&mut session).await?;
        let transition = apply(&session.state, &event, self.questionnaire, role)?;

        if let Some(effect) = transition.effect {
            self.perform(&mut session, effect).await?;
        }
        if let Some(user_id) = session.user_id {
            self.store.touch_last_active(user_id).await?;
        }

        debug!(
            "Session {external_id}: {} --{}--> {}",
            session.state.name(),
            event.name(),
            transition.next.name()
        );
        session.state = transition.next;
        session.updated_at = Utc::now();
        self.sessions.save(&session).await?;
        Ok(session)
    }

    async fn perform(&self, session: &mut Session, effect: Effect) -> Result<(), AppError> {
        match effect {
            Effect::CreateUser { role } => {
                let user = self
                    .store
                    .create_user(NewUser {
                        external_id: session.external_id,
                        role,
                        contact: None,
                    })
                    .await?;
                info!(
                    "event=user_registered user_id={} external_id={} role={role}",
                    user.id, session.external_id
                );
                session.user_id = Some(user.id);
                session.user_role = Some(user.role);
            }
            Effect::SaveContact(contact) => {
                self.update_profile(
                    session,
                    ProfileUpdate {
                        contact: Some(contact),
                        about: None,
                    },
                )
                .await?;
            }
            Effect::SaveAbout(about) => {
                self.update_profile(
                    session,
                    ProfileUpdate {
                        contact: None,
                        about: Some(about),
                    },
                )
                .await?;
            }
            Effect::CompleteTest(answers) => {
                let user = require_user(self.store, registered(session)?).await?;
                let aggregation = aggregate(self.questionnaire, user.role, &answers);
                self.store
                    .save_test_results(
                        user.id,
                        &aggregation.profile,
                        &aggregation.accepted_answers,
                    )
                    .await?;
                let scored = recalc_for(self.store, self.scorer, user.id).await?;
                info!(
                    "event=test_completed user_id={} role={} answers={} scores={scored}",
                    user.id,
                    user.role,
                    aggregation.accepted_answers.len()
                );
            }
        }
        Ok(())
    }

    /// Role for question selection. Sessions saved before the role was tracked
    /// fall back to the stored user.
    async fn role_of(&self, session: &mut Session) -> Result<Option<Role>, AppError> {
        if session.user_role.is_none() {
            if let Some(user_id) = session.user_id {
                session.user_role = Some(require_user(self.store, user_id).await?.role);
            }
        }
        Ok(session.user_role)
    }

    async fn update_profile(&self, session: &Session, update: ProfileUpdate) -> Result<(), AppError> {
        let user_id = registered(session)?;
        if !self.store.update_profile(user_id, update).await? {
            return Err(AppError::NotFound(format!("User {user_id} not found")));
        }
        Ok(())
    }
}

fn registered(session: &Session) -> Result<i64, AppError> {
    session.user_id.ok_or_else(|| {
        AppError::Internal(anyhow!(
            "Session {} is past registration without a user",
            session.external_id
        ))
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::conversation::session::{MemorySessionStore, SessionLock};
    use crate::matching::scorer::DifferenceScorer;
    use crate::matching::ScoringStrategy;
    use crate::models::user::TraitProfile;
    use crate::questionnaire::tests::{SECTIONED_QUESTIONNAIRE, WARMTH_QUESTIONNAIRE};
    use crate::store::MemoryStore;

    struct Fixture {
        store: MemoryStore,
        sessions: MemorySessionStore,
        questionnaire: Questionnaire,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_questionnaire(WARMTH_QUESTIONNAIRE)
        }

        fn with_questionnaire(json: &str) -> Self {
            Self {
                store: MemoryStore::new(),
                sessions: MemorySessionStore::new(),
                questionnaire: Questionnaire::from_json_str(json, ScoringStrategy::Difference)
                    .unwrap(),
            }
        }

        fn conversation(&self) -> Conversation<'_> {
            Conversation {
                store: &self.store,
                sessions: &self.sessions,
                scorer: &DifferenceScorer,
                questionnaire: &self.questionnaire,
            }
        }

        async fn run(&self, external_id: i64, events: Vec<ConversationEvent>) -> Session {
            let conversation = self.conversation();
            let mut session = conversation.session(external_id).await.unwrap();
            for event in events {
                session = conversation.handle_event(external_id, event).await.unwrap();
            }
            session
        }
    }

    fn onboarding(role: Role, answers: &[i64]) -> Vec<ConversationEvent> {
        let mut events = vec![
            ConversationEvent::ChooseRole { role },
            ConversationEvent::SubmitContact {
                contact: "@someone".to_string(),
            },
            ConversationEvent::SubmitProfile {
                about: "About me".to_string(),
            },
            ConversationEvent::StartTest,
        ];
        events.extend(
            answers
                .iter()
                .map(|value| ConversationEvent::Answer { value: *value }),
        );
        events
    }

    #[tokio::test]
    async fn test_full_onboarding_persists_profile_and_scores() {
        let fx = Fixture::new();
        let provider = fx.run(10, onboarding(Role::Provider, &[5, 5])).await;
        let seeker = fx.run(20, onboarding(Role::Seeker, &[5, 5])).await;
        assert_eq!(seeker.state, ConversationState::TestComplete);

        let seeker_id = seeker.user_id.unwrap();
        let provider_id = provider.user_id.unwrap();
        let user = fx.store.get_user(seeker_id).await.unwrap().unwrap();
        assert!(user.test_completed);
        assert_eq!(user.contact.as_deref(), Some("@someone"));
        assert_eq!(user.about.as_deref(), Some("About me"));
        assert_eq!(
            user.trait_profile,
            Some(TraitProfile::Traits(
                [("focus".to_string(), 1.0), ("warmth".to_string(), 1.0)].into()
            ))
        );
        assert_eq!(fx.store.list_answers(seeker_id).await.unwrap().len(), 2);
        let score = fx.store.get_score(seeker_id, provider_id).await.unwrap();
        assert_eq!(score.unwrap().score, 100.0);
    }

    #[tokio::test]
    async fn test_invalid_event_leaves_session_unchanged() {
        let fx = Fixture::new();
        let conversation = fx.conversation();
        fx.run(1, vec![ConversationEvent::ChooseRole { role: Role::Seeker }])
            .await;

        let err = conversation
            .handle_event(1, ConversationEvent::StartTest)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
        let session = conversation.session(1).await.unwrap();
        assert_eq!(session.state, ConversationState::RoleChosen { role: Role::Seeker });
    }

    #[tokio::test]
    async fn test_returning_user_resumes_from_store() {
        let fx = Fixture::new();
        let done = fx.run(1, onboarding(Role::Seeker, &[3, 3])).await;
        let halfway = fx
            .run(
                2,
                vec![
                    ConversationEvent::ChooseRole {
                        role: Role::Provider,
                    },
                    ConversationEvent::SubmitContact {
                        contact: "@p".to_string(),
                    },
                ],
            )
            .await;

        fx.sessions.clear(1).await.unwrap();
        fx.sessions.clear(2).await.unwrap();

        let conversation = fx.conversation();
        let resumed = conversation.session(1).await.unwrap();
        assert_eq!(resumed.state, ConversationState::TestComplete);
        assert_eq!(resumed.user_id, done.user_id);

        let resumed = conversation.session(2).await.unwrap();
        assert_eq!(resumed.state, ConversationState::ProfileComplete);
        assert_eq!(resumed.user_id, halfway.user_id);

        let fresh = conversation.session(3).await.unwrap();
        assert_eq!(fresh.state, ConversationState::New);
        assert!(fresh.user_id.is_none());
    }

    #[tokio::test]
    async fn test_retake_rewrites_profile() {
        let fx = Fixture::new();
        let session = fx.run(1, onboarding(Role::Seeker, &[5, 5])).await;
        fx.run(
            1,
            vec![
                ConversationEvent::RetakeTest,
                ConversationEvent::Answer { value: 1 },
                ConversationEvent::Answer { value: 1 },
            ],
        )
        .await;

        let user = fx
            .store
            .get_user(session.user_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            user.trait_profile,
            Some(TraitProfile::Traits(
                [("focus".to_string(), 0.0), ("warmth".to_string(), 0.0)].into()
            ))
        );
    }

    #[tokio::test]
    async fn test_each_role_answers_its_own_section() {
        let fx = Fixture::with_questionnaire(SECTIONED_QUESTIONNAIRE);
        let provider = fx.run(10, onboarding(Role::Provider, &[5, 5, 5])).await;
        let seeker = fx.run(20, onboarding(Role::Seeker, &[5, 5])).await;
        assert_eq!(provider.state, ConversationState::TestComplete);
        assert_eq!(seeker.state, ConversationState::TestComplete);
        assert_eq!(seeker.user_role, Some(Role::Seeker));

        let seeker_id = seeker.user_id.unwrap();
        let provider_id = provider.user_id.unwrap();
        let answered: Vec<String> = fx
            .store
            .list_answers(provider_id)
            .await
            .unwrap()
            .into_iter()
            .map(|answer| answer.question_id)
            .collect();
        assert_eq!(answered, vec!["p_check_in", "p_homework", "p_listen"]);
        assert_eq!(fx.store.list_answers(seeker_id).await.unwrap().len(), 2);

        let score = fx.store.get_score(seeker_id, provider_id).await.unwrap();
        assert_eq!(score.unwrap().score, 100.0);
    }

    #[tokio::test]
    async fn test_session_without_role_uses_stored_user() {
        let fx = Fixture::with_questionnaire(SECTIONED_QUESTIONNAIRE);
        let mut events = onboarding(Role::Provider, &[]);
        events.push(ConversationEvent::Answer { value: 3 });
        let mut session = fx.run(4, events).await;

        session.user_role = None;
        fx.sessions.save(&session).await.unwrap();

        let conversation = fx.conversation();
        conversation
            .handle_event(4, ConversationEvent::Answer { value: 3 })
            .await
            .unwrap();
        let session = conversation
            .handle_event(4, ConversationEvent::Answer { value: 3 })
            .await
            .unwrap();
        assert_eq!(session.state, ConversationState::TestComplete);
        assert_eq!(session.user_role, Some(Role::Provider));
    }

    /// Yields on every access so concurrent events interleave.
    struct YieldingSessions(MemorySessionStore);

    #[async_trait]
    impl SessionStore for YieldingSessions {
        async fn load(&self, external_id: i64) -> Result<Option<Session>, AppError> {
            tokio::task::yield_now().await;
            self.0.load(external_id).await
        }

        async fn save(&self, session: &Session) -> Result<(), AppError> {
            tokio::task::yield_now().await;
            self.0.save(session).await
        }

        async fn clear(&self, external_id: i64) -> Result<(), AppError> {
            self.0.clear(external_id).await
        }

        async fn lock(&self, external_id: i64) -> Result<SessionLock, AppError> {
            self.0.lock(external_id).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_answers_are_not_lost() {
        let fx = Fixture::new();
        let sessions = YieldingSessions(MemorySessionStore::new());
        let conversation = Conversation {
            store: &fx.store,
            sessions: &sessions,
            scorer: &DifferenceScorer,
            questionnaire: &fx.questionnaire,
        };
        for event in onboarding(Role::Seeker, &[]) {
            conversation.handle_event(8, event).await.unwrap();
        }

        let (first, second) = tokio::join!(
            conversation.handle_event(8, ConversationEvent::Answer { value: 5 }),
            conversation.handle_event(8, ConversationEvent::Answer { value: 4 }),
        );
        first.unwrap();
        second.unwrap();

        let session = conversation.session(8).await.unwrap();
        assert_eq!(session.state, ConversationState::TestComplete);
        let user_id = session.user_id.unwrap();
        assert_eq!(fx.store.list_answers(user_id).await.unwrap().len(), 2);
    }
}
