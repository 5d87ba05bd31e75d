use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::conversation::service::Conversation;
use crate::conversation::session::Session;
use crate::conversation::{ConversationEvent, ConversationState};
use crate::errors::AppError;
use crate::questionnaire::{Question, Questionnaire};
use crate::state::AppState;

#[derive(Serialize)]
pub struct ConversationView {
    pub session: Session,
    /// The question to present while a test is in progress.
    pub next_question: Option<Question>,
}

impl ConversationView {
    fn new(session: Session, questionnaire: &Questionnaire) -> Self {
        let next_question = match (&session.state, session.user_role) {
            (ConversationState::TestInProgress { question_index, .. }, Some(role)) => {
                questionnaire.question_at(role, *question_index).ok().cloned()
            }
            _ => None,
        };
        Self {
            session,
            next_question,
        }
    }
}

/// GET /api/v1/questionnaire
pub async fn handle_get_questionnaire(State(state): State<AppState>) -> Json<Questionnaire> {
    Json(state.questionnaire.as_ref().clone())
}

/// GET /api/v1/conversations/:external_id
pub async fn handle_get_conversation(
    State(state): State<AppState>,
    Path(external_id): Path<i64>,
) -> Result<Json<ConversationView>, AppError> {
    let session = Conversation::from_state(&state).session(external_id).await?;
    Ok(Json(ConversationView::new(session, &state.questionnaire)))
}

/// POST /api/v1/conversations/:external_id/events
pub async fn handle_conversation_event(
    State(state): State<AppState>,
    Path(external_id): Path<i64>,
    Json(event): Json<ConversationEvent>,
) -> Result<Json<ConversationView>, AppError> {
    let session = Conversation::from_state(&state)
        .handle_event(external_id, event)
        .await?;
    Ok(Json(ConversationView::new(session, &state.questionnaire)))
}
