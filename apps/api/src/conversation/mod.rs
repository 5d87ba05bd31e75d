//! Conversation state machine for registration and the questionnaire.
//!
//! `apply` is pure: it validates an event against the current state and returns the
//! next state plus the side effect the service must perform. Events that do not fit
//! the current state are rejected with `AppError::InvalidTransition`.
//!
//! ```text
//! New ──ChooseRole──▶ RoleChosen ──SubmitContact──▶ ContactCaptured
//!     ──SubmitProfile──▶ ProfileComplete ──StartTest──▶ TestInProgress(0)
//!     ──Answer × n──▶ TestComplete ──RetakeTest──▶ TestInProgress(0)
//! ```

pub mod handlers;
pub mod service;
pub mod session;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::user::Role;
use crate::questionnaire::Questionnaire;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversationState {
    New,
    RoleChosen {
        role: Role,
    },
    ContactCaptured,
    ProfileComplete,
    TestInProgress {
        question_index: usize,
        /// Question id → raw answer, collected so far.
        answers: BTreeMap<String, i64>,
    },
    TestComplete,
}

impl ConversationState {
    pub fn name(&self) -> &'static str {
        match self {
            ConversationState::New => "new",
            ConversationState::RoleChosen { .. } => "role_chosen",
            ConversationState::ContactCaptured => "contact_captured",
            ConversationState::ProfileComplete => "profile_complete",
            ConversationState::TestInProgress { .. } => "test_in_progress",
            ConversationState::TestComplete => "test_complete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    ChooseRole { role: Role },
    SubmitContact { contact: String },
    SubmitProfile { about: String },
    StartTest,
    Answer { value: i64 },
    RetakeTest,
}

impl ConversationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ConversationEvent::ChooseRole { .. } => "choose_role",
            ConversationEvent::SubmitContact { .. } => "submit_contact",
            ConversationEvent::SubmitProfile { .. } => "submit_profile",
            ConversationEvent::StartTest => "start_test",
            ConversationEvent::Answer { .. } => "answer",
            ConversationEvent::RetakeTest => "retake_test",
        }
    }
}

/// Work the service performs for a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CreateUser { role: Role },
    SaveContact(String),
    SaveAbout(String),
    /// Last answer given: aggregate, persist and rescore.
    CompleteTest(BTreeMap<String, i64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: ConversationState,
    pub effect: Option<Effect>,
}

impl Transition {
    fn to(next: ConversationState) -> Self {
        Self { next, effect: None }
    }

    fn with(next: ConversationState, effect: Effect) -> Self {
        Self {
            next,
            effect: Some(effect),
        }
    }
}

fn first_question() -> ConversationState {
    ConversationState::TestInProgress {
        question_index: 0,
        answers: BTreeMap::new(),
    }
}

/// `role` is the registered user's role; questions are drawn from that role's
/// section. It is `None` only before `ChooseRole`.
pub fn apply(
    state: &ConversationState,
    event: &ConversationEvent,
    questionnaire: &Questionnaire,
    role: Option<Role>,
) -> Result<Transition, AppError> {
    use ConversationEvent as E;
    use ConversationState as S;

    match (state, event) {
        (S::New, E::ChooseRole { role }) => Ok(Transition::with(
            S::RoleChosen { role: *role },
            Effect::CreateUser { role: *role },
        )),
        (S::RoleChosen { .. }, E::SubmitContact { contact }) => {
            let contact = contact.trim();
            if contact.is_empty() {
                return Err(AppError::Validation("Contact must not be blank".to_string()));
            }
            Ok(Transition::with(
                S::ContactCaptured,
                Effect::SaveContact(contact.to_string()),
            ))
        }
        (S::ContactCaptured, E::SubmitProfile { about }) => Ok(Transition::with(
            S::ProfileComplete,
            Effect::SaveAbout(about.trim().to_string()),
        )),
        (S::ProfileComplete, E::StartTest) | (S::TestComplete, E::RetakeTest) => {
            Ok(Transition::to(first_question()))
        }
        (
            S::TestInProgress {
                question_index,
                answers,
            },
            E::Answer { value },
        ) => {
            let role = role.ok_or_else(|| {
                AppError::InvalidTransition("Answer given before a role was chosen".to_string())
            })?;
            let question = questionnaire.question_at(role, *question_index)?;
            let mut answers = answers.clone();
            answers.insert(question.id.clone(), *value);

            let next_index = question_index + 1;
            if next_index >= questionnaire.question_count(role) {
                Ok(Transition::with(S::TestComplete, Effect::CompleteTest(answers)))
            } else {
                Ok(Transition::to(S::TestInProgress {
                    question_index: next_index,
                    answers,
                }))
            }
        }
        (state, event) => Err(AppError::InvalidTransition(format!(
            "Event '{}' is not accepted in state '{}'",
            event.name(),
            state.name()
        ))),
    }
}
