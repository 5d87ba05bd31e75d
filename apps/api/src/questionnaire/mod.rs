//! Questionnaire definition: question prompts, trait weights and the answer scale.
//!
//! Loaded once at startup and shared read-only through `AppState`. A definition that
//! does not fit the configured scoring strategy is rejected with `AppError::Config`
//! so the service never starts with a questionnaire it cannot aggregate.
//!
//! A definition either lists `questions` shared by both roles or gives each role its
//! own list under `sections.seeker` / `sections.provider`. Sections must cover the
//! same trait names (or the same vector length) so profiles stay comparable.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::matching::ScoringStrategy;
use crate::models::user::Role;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scale {
    pub min: i64,
    pub max: i64,
}

impl Default for Scale {
    fn default() -> Self {
        Self { min: 1, max: 5 }
    }
}

/// Widest scale accepted from a definition file.
pub const MAX_SCALE_POINTS: i64 = 100;

impl Scale {
    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }

    /// Linear map of a (clamped) answer into [0, 1].
    pub fn normalize(&self, value: i64) -> f64 {
        let value = self.clamp(value);
        (value - self.min) as f64 / (self.max - self.min) as f64
    }

    pub fn span(&self) -> usize {
        (self.max - self.min + 1) as usize
    }

    /// Scale points as `max - min + 1`, or `None` when the bounds are inverted,
    /// equal or too far apart.
    fn checked_span(&self) -> Option<i64> {
        let points = self.max.checked_sub(self.min)?.checked_add(1)?;
        (2..=MAX_SCALE_POINTS).contains(&points).then_some(points)
    }
}

/// Weighted-vector questionnaires list one option per scale point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerOption {
    pub text: String,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: String,
    pub text: String,
    /// Trait name → weight (normalized-difference strategy).
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    /// Per-answer weight vectors (weighted-vector strategy).
    #[serde(default)]
    pub options: Vec<AnswerOption>,
}

/// Separate question lists for each audience. Both map onto the same traits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleSections {
    pub seeker: Vec<Question>,
    pub provider: Vec<Question>,
}

impl RoleSections {
    fn for_role(&self, role: Role) -> &[Question] {
        match role {
            Role::Seeker => &self.seeker,
            Role::Provider => &self.provider,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct QuestionnaireSource {
    /// Shared by both roles when `sections` is absent.
    #[serde(default)]
    questions: Vec<Question>,
    #[serde(default)]
    sections: Option<RoleSections>,
    #[serde(default)]
    scale: Option<Scale>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Questionnaire {
    sections: RoleSections,
    scale: Scale,
    #[serde(skip)]
    strategy: ScoringStrategy,
}

impl Questionnaire {
    /// Reads and validates a questionnaire JSON file.
    pub fn load(path: &Path, strategy: ScoringStrategy) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "Cannot read questionnaire at {}: {e}",
                path.display()
            ))
        })?;
        let questionnaire = Self::from_json_str(&raw, strategy)?;
        info!(
            "Loaded questionnaire from {} ({} seeker / {} provider questions, scale {}..{}, strategy {})",
            path.display(),
            questionnaire.question_count(Role::Seeker),
            questionnaire.question_count(Role::Provider),
            questionnaire.scale.min,
            questionnaire.scale.max,
            strategy.as_str()
        );
        Ok(questionnaire)
    }

    pub fn from_json_str(raw: &str, strategy: ScoringStrategy) -> Result<Self, AppError> {
        let source: QuestionnaireSource = serde_json::from_str(raw)
            .map_err(|e| AppError::Config(format!("Malformed questionnaire: {e}")))?;
        let sections = match source.sections {
            Some(_) if !source.questions.is_empty() => {
                return Err(AppError::Config(
                    "Questionnaire defines both 'questions' and 'sections'".to_string(),
                ));
            }
            Some(sections) => sections,
            None => RoleSections {
                seeker: source.questions.clone(),
                provider: source.questions,
            },
        };
        let questionnaire = Self {
            sections,
            scale: source.scale.unwrap_or_default(),
            strategy,
        };
        questionnaire.validate()?;
        Ok(questionnaire)
    }

    pub fn question_count(&self, role: Role) -> usize {
        self.questions(role).len()
    }

    pub fn question_at(&self, role: Role, index: usize) -> Result<&Question, AppError> {
        self.questions(role).get(index).ok_or_else(|| {
            AppError::NotFound(format!("Question #{index} for {role}s not found"))
        })
    }

    pub fn question(&self, role: Role, id: &str) -> Option<&Question> {
        self.questions(role).iter().find(|q| q.id == id)
    }

    pub fn questions(&self, role: Role) -> &[Question] {
        self.sections.for_role(role)
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn strategy(&self) -> ScoringStrategy {
        self.strategy
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.scale.checked_span().is_none() {
            return Err(AppError::Config(format!(
                "Scale {}..{} must have between 2 and {MAX_SCALE_POINTS} points",
                self.scale.min, self.scale.max
            )));
        }

        for role in [Role::Seeker, Role::Provider] {
            let questions = self.questions(role);
            if questions.is_empty() {
                return Err(AppError::Config(format!("Questionnaire has no {role} questions")));
            }
            let mut seen = HashSet::new();
            for question in questions {
                if question.id.trim().is_empty() {
                    return Err(AppError::Config(format!("{role} question with empty id")));
                }
                if !seen.insert(question.id.as_str()) {
                    return Err(AppError::Config(format!(
                        "Duplicate {role} question id '{}'",
                        question.id
                    )));
                }
            }
        }

        match self.strategy {
            ScoringStrategy::Difference => self.validate_trait_weights(),
            ScoringStrategy::Cosine => self.validate_weight_vectors(),
        }
    }

    fn validate_trait_weights(&self) -> Result<(), AppError> {
        let mut trait_sets = Vec::with_capacity(2);
        for role in [Role::Seeker, Role::Provider] {
            let mut traits = BTreeSet::new();
            for question in self.questions(role) {
                if question.weights.is_empty() {
                    return Err(AppError::Config(format!(
                        "Question '{}' is missing trait weights",
                        question.id
                    )));
                }
                for (trait_name, weight) in &question.weights {
                    if !weight.is_finite() || *weight < 0.0 {
                        return Err(AppError::Config(format!(
                            "Question '{}' has invalid weight {weight} for trait '{trait_name}'",
                            question.id
                        )));
                    }
                    traits.insert(trait_name.as_str());
                }
            }
            trait_sets.push(traits);
        }
        if trait_sets[0] != trait_sets[1] {
            return Err(AppError::Config(format!(
                "Seeker traits {:?} differ from provider traits {:?}",
                trait_sets[0], trait_sets[1]
            )));
        }
        Ok(())
    }

    fn validate_weight_vectors(&self) -> Result<(), AppError> {
        let span = self.scale.span();
        let mut dimensions: Option<usize> = None;

        for question in self.all_questions() {
            if question.options.is_empty() {
                return Err(AppError::Config(format!(
                    "Question '{}' has an empty option list",
                    question.id
                )));
            }
            if question.options.len() != span {
                return Err(AppError::Config(format!(
                    "Question '{}' has {} options but the scale has {span} points",
                    question.id,
                    question.options.len()
                )));
            }
            for option in &question.options {
                if option.weights.is_empty() || option.weights.iter().any(|w| !w.is_finite()) {
                    return Err(AppError::Config(format!(
                        "Question '{}' has an option with missing or invalid weights",
                        question.id
                    )));
                }
                match dimensions {
                    None => dimensions = Some(option.weights.len()),
                    Some(d) if d != option.weights.len() => {
                        return Err(AppError::Config(format!(
                            "Question '{}' has a weight vector of length {} (expected {d})",
                            question.id,
                            option.weights.len()
                        )));
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    fn all_questions(&self) -> impl Iterator<Item = &Question> {
        self.sections.seeker.iter().chain(&self.sections.provider)
    }

    /// Length of every weight vector, shared by both roles. Zero for trait-weight
    /// questionnaires.
    pub fn dimensions(&self) -> usize {
        self.all_questions()
            .next()
            .and_then(|q| q.options.first())
            .map(|o| o.weights.len())
            .unwrap_or(0)
    }
}
