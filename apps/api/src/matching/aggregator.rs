//! Trait Aggregator: turns raw questionnaire answers into a `TraitProfile`.
//!
//! Normalized-difference strategy:
//! 1. Clamp each answer into the scale and map it linearly into [0, 1].
//! 2. For every trait in the question's weight map accumulate
//!    `normalized × weight` and `weight`.
//! 3. trait value = Σ(normalized × weight) / Σ(weight); traits whose weight total
//!    is zero are omitted.
//!
//! Weighted-vector strategy: `Σ options[value − min].weights × value` over the
//! answered questions, then divided by the largest absolute component (skipped
//! when every component is zero).
//!
//! Only the questions of the user's own role count; unknown ids and ids from the
//! other role's section are ignored. The accepted answers carry the clamped value,
//! which is what gets persisted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::matching::ScoringStrategy;
use crate::models::user::{Role, TraitProfile};
use crate::questionnaire::Questionnaire;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcceptedAnswer {
    pub question_id: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub profile: TraitProfile,
    pub accepted_answers: Vec<AcceptedAnswer>,
}

pub fn aggregate(
    questionnaire: &Questionnaire,
    role: Role,
    answers: &BTreeMap<String, i64>,
) -> Aggregation {
    let aggregation = match questionnaire.strategy() {
        ScoringStrategy::Difference => aggregate_traits(questionnaire, role, answers),
        ScoringStrategy::Cosine => aggregate_vector(questionnaire, role, answers),
    };
    debug!(
        "Aggregated {} of {} answers for a {role} into a {} profile",
        aggregation.accepted_answers.len(),
        answers.len(),
        aggregation.profile.kind()
    );
    aggregation
}

fn aggregate_traits(
    questionnaire: &Questionnaire,
    role: Role,
    answers: &BTreeMap<String, i64>,
) -> Aggregation {
    let scale = questionnaire.scale();
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    let mut weight_totals: BTreeMap<String, f64> = BTreeMap::new();
    let mut accepted_answers = Vec::new();

    for (question_id, raw) in answers {
        let Some(question) = questionnaire.question(role, question_id) else {
            continue;
        };
        let value = scale.clamp(*raw);
        let normalized = scale.normalize(value);
        for (trait_name, weight) in &question.weights {
            *totals.entry(trait_name.clone()).or_default() += normalized * weight;
            *weight_totals.entry(trait_name.clone()).or_default() += weight;
        }
        accepted_answers.push(AcceptedAnswer {
            question_id: question_id.clone(),
            value,
        });
    }

    let traits = totals
        .into_iter()
        .filter_map(|(trait_name, total)| {
            let weight = weight_totals.get(&trait_name).copied().unwrap_or(0.0);
            (weight > 0.0).then(|| (trait_name, total / weight))
        })
        .collect();

    Aggregation {
        profile: TraitProfile::Traits(traits),
        accepted_answers,
    }
}

fn aggregate_vector(
    questionnaire: &Questionnaire,
    role: Role,
    answers: &BTreeMap<String, i64>,
) -> Aggregation {
    let scale = questionnaire.scale();
    let mut vector = vec![0.0_f64; questionnaire.dimensions()];
    let mut accepted_answers = Vec::new();

    for (question_id, raw) in answers {
        let Some(question) = questionnaire.question(role, question_id) else {
            continue;
        };
        let value = scale.clamp(*raw);
        let index = (value - scale.min) as usize;
        let Some(option) = question.options.get(index) else {
            continue;
        };
        for (component, weight) in vector.iter_mut().zip(&option.weights) {
            *component += weight * value as f64;
        }
        accepted_answers.push(AcceptedAnswer {
            question_id: question_id.clone(),
            value,
        });
    }

    let max_abs = vector.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if max_abs > 0.0 {
        for component in vector.iter_mut() {
            *component /= max_abs;
        }
    }

    Aggregation {
        profile: TraitProfile::Vector(vector),
        accepted_answers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questionnaire::tests::{
        SECTIONED_QUESTIONNAIRE, VECTOR_QUESTIONNAIRE, WARMTH_QUESTIONNAIRE,
    };

    fn answers(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn single_warmth_question() -> Questionnaire {
        let raw = r#"{"scale": {"min": 1, "max": 5},
            "questions": [{"id": "q1", "text": "?", "weights": {"warmth": 1.0}}]}"#;
        Questionnaire::from_json_str(raw, ScoringStrategy::Difference).unwrap()
    }

    fn traits_of(aggregation: &Aggregation) -> &BTreeMap<String, f64> {
        match &aggregation.profile {
            TraitProfile::Traits(t) => t,
            other => panic!("expected traits profile, got {other:?}"),
        }
    }

    #[test]
    fn test_top_answer_gives_full_trait() {
        let q = single_warmth_question();
        let result = aggregate(&q, Role::Seeker, &answers(&[("q1", 5)]));
        assert_eq!(traits_of(&result)["warmth"], 1.0);
    }

    #[test]
    fn test_bottom_answer_gives_zero_trait() {
        let q = single_warmth_question();
        let result = aggregate(&q, Role::Provider, &answers(&[("q1", 1)]));
        assert_eq!(traits_of(&result)["warmth"], 0.0);
    }

    #[test]
    fn test_out_of_range_answer_is_clamped_and_stored_clamped() {
        let q = single_warmth_question();
        let result = aggregate(&q, Role::Seeker, &answers(&[("q1", 42)]));
        assert_eq!(traits_of(&result)["warmth"], 1.0);
        assert_eq!(
            result.accepted_answers,
            vec![AcceptedAnswer {
                question_id: "q1".to_string(),
                value: 5
            }]
        );
    }

    #[test]
    fn test_unknown_questions_ignored() {
        let q = single_warmth_question();
        let result = aggregate(&q, Role::Seeker, &answers(&[("q1", 3), ("bogus", 5)]));
        assert_eq!(result.accepted_answers.len(), 1);
        assert_eq!(result.accepted_answers[0].question_id, "q1");
        assert_eq!(traits_of(&result).len(), 1);
    }

    #[test]
    fn test_weighted_average_across_questions() {
        let q = Questionnaire::from_json_str(WARMTH_QUESTIONNAIRE, ScoringStrategy::Difference)
            .unwrap();
        // q1 → warmth 1.0 (w 1.0); q2 → 0.0 for focus (w 1.0) and warmth (w 0.5)
        let result = aggregate(&q, Role::Seeker, &answers(&[("q1", 5), ("q2", 1)]));
        let traits = traits_of(&result);
        assert!((traits["warmth"] - 1.0 / 1.5).abs() < 1e-9);
        assert_eq!(traits["focus"], 0.0);
    }

    #[test]
    fn test_zero_weight_traits_omitted() {
        let raw = r#"{"questions": [{"id": "q1", "text": "?", "weights": {"warmth": 1.0, "ghost": 0.0}}]}"#;
        let q = Questionnaire::from_json_str(raw, ScoringStrategy::Difference).unwrap();
        let result = aggregate(&q, Role::Seeker, &answers(&[("q1", 4)]));
        assert!(!traits_of(&result).contains_key("ghost"));
        assert!(traits_of(&result).contains_key("warmth"));
    }

    #[test]
    fn test_no_answers_gives_empty_profile() {
        let q = single_warmth_question();
        let result = aggregate(&q, Role::Seeker, &BTreeMap::new());
        assert!(result.profile.is_empty());
        assert!(result.accepted_answers.is_empty());
    }

    #[test]
    fn test_vector_profile_scaled_to_unit_max() {
        let q = Questionnaire::from_json_str(VECTOR_QUESTIONNAIRE, ScoringStrategy::Cosine)
            .unwrap();
        // stress=1 → [1,0]*1 ; change=1 → [1,1]*1 → [2,1] → [1.0, 0.5]
        let result = aggregate(&q, Role::Seeker, &answers(&[("stress", 1), ("change", 1)]));
        assert_eq!(result.profile, TraitProfile::Vector(vec![1.0, 0.5]));
    }

    #[test]
    fn test_vector_profile_all_zero_skips_scaling() {
        let q = Questionnaire::from_json_str(VECTOR_QUESTIONNAIRE, ScoringStrategy::Cosine)
            .unwrap();
        let result = aggregate(&q, Role::Provider, &answers(&[("change", 3)]));
        assert_eq!(result.profile, TraitProfile::Vector(vec![0.0, 0.0]));
    }

    #[test]
    fn test_vector_answer_clamped_into_scale() {
        let q = Questionnaire::from_json_str(VECTOR_QUESTIONNAIRE, ScoringStrategy::Cosine)
            .unwrap();
        // 9 clamps to 3 → option "go for a run" [0.5, 0.5] * 3 → [1.5, 1.5] → [1, 1]
        let result = aggregate(&q, Role::Seeker, &answers(&[("stress", 9)]));
        assert_eq!(result.profile, TraitProfile::Vector(vec![1.0, 1.0]));
        assert_eq!(result.accepted_answers[0].value, 3);
    }

    #[test]
    fn test_other_roles_questions_ignored() {
        let q = Questionnaire::from_json_str(SECTIONED_QUESTIONNAIRE, ScoringStrategy::Difference)
            .unwrap();
        let given = answers(&[("s_talk", 5), ("p_homework", 5)]);

        let seeker = aggregate(&q, Role::Seeker, &given);
        assert_eq!(seeker.accepted_answers.len(), 1);
        assert_eq!(seeker.accepted_answers[0].question_id, "s_talk");
        assert_eq!(traits_of(&seeker).get("warmth"), Some(&1.0));
        assert!(!traits_of(&seeker).contains_key("focus"));

        let provider = aggregate(&q, Role::Provider, &given);
        assert_eq!(provider.accepted_answers[0].question_id, "p_homework");
        assert_eq!(traits_of(&provider).get("focus"), Some(&1.0));
        assert!(!traits_of(&provider).contains_key("warmth"));
    }

    #[test]
    fn test_sections_map_onto_shared_traits() {
        let q = Questionnaire::from_json_str(SECTIONED_QUESTIONNAIRE, ScoringStrategy::Difference)
            .unwrap();
        let seeker = aggregate(&q, Role::Seeker, &answers(&[("s_talk", 5), ("s_plan", 1)]));
        let provider = aggregate(
            &q,
            Role::Provider,
            &answers(&[("p_listen", 5), ("p_homework", 1), ("p_check_in", 3)]),
        );
        let seeker_traits: Vec<&String> = traits_of(&seeker).keys().collect();
        let provider_traits: Vec<&String> = traits_of(&provider).keys().collect();
        assert_eq!(seeker_traits, provider_traits);
    }
}
