//! Compatibility Scorer: pluggable, trait-based similarity between two trait profiles.
//!
//! `DifferenceScorer` pairs with the normalized trait aggregator,
//! `CosineScorer` with the weighted-vector aggregator. `AppState` holds exactly one
//! of them as `Arc<dyn CompatibilityScorer>`, chosen at startup from `SCORING_STRATEGY`.
//!
//! Every scorer is pure and returns a value clamped to [0, 100].

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::errors::AppError;
use crate::matching::ScoringStrategy;
use crate::models::user::TraitProfile;

/// Trait value assumed when only one side of the pair has the trait.
const NEUTRAL_TRAIT: f64 = 0.5;

pub trait CompatibilityScorer: Send + Sync {
    /// Scores a seeker profile against a provider profile.
    ///
    /// Fails with `StrategyMismatch` when the profiles were built by different
    /// aggregation strategies.
    fn score(&self, seeker: &TraitProfile, provider: &TraitProfile) -> Result<f64, AppError>;

    fn strategy(&self) -> ScoringStrategy;
}

pub fn scorer_for(strategy: ScoringStrategy) -> Arc<dyn CompatibilityScorer> {
    match strategy {
        ScoringStrategy::Difference => Arc::new(DifferenceScorer),
        ScoringStrategy::Cosine => Arc::new(CosineScorer),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DifferenceScorer
// ────────────────────────────────────────────────────────────────────────────

/// Mean of `1 − min(|a − b|, 1)` over the union of trait names, × 100,
/// rounded to two decimals. Missing traits count as neutral (0.5).
pub struct DifferenceScorer;

impl CompatibilityScorer for DifferenceScorer {
    fn score(&self, seeker: &TraitProfile, provider: &TraitProfile) -> Result<f64, AppError> {
        match (seeker, provider) {
            (TraitProfile::Traits(a), TraitProfile::Traits(b)) => {
                if a.is_empty() || b.is_empty() {
                    return Ok(0.0);
                }
                let names: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
                let total: f64 = names
                    .iter()
                    .map(|name| {
                        let a_val = a.get(*name).copied().unwrap_or(NEUTRAL_TRAIT);
                        let b_val = b.get(*name).copied().unwrap_or(NEUTRAL_TRAIT);
                        1.0 - (a_val - b_val).abs().min(1.0)
                    })
                    .sum();
                let mean = total / names.len() as f64;
                Ok(round_to(mean * 100.0, 2).clamp(0.0, 100.0))
            }
            _ => Err(mismatch(self.strategy(), seeker, provider)),
        }
    }

    fn strategy(&self) -> ScoringStrategy {
        ScoringStrategy::Difference
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CosineScorer
// ────────────────────────────────────────────────────────────────────────────

/// `((cos θ + 1) / 2) × 100`, rounded to one decimal. Zero-magnitude vectors and
/// vectors of different length score 0.0.
pub struct CosineScorer;

impl CompatibilityScorer for CosineScorer {
    fn score(&self, seeker: &TraitProfile, provider: &TraitProfile) -> Result<f64, AppError> {
        match (seeker, provider) {
            (TraitProfile::Vector(a), TraitProfile::Vector(b)) => {
                if a.len() != b.len() {
                    return Ok(0.0);
                }
                let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let mag_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
                let mag_b = b.iter().map(|y| y * y).sum::<f64>().sqrt();
                if mag_a == 0.0 || mag_b == 0.0 {
                    return Ok(0.0);
                }
                let cosine = (dot / (mag_a * mag_b)).clamp(-1.0, 1.0);
                Ok(round_to((cosine + 1.0) / 2.0 * 100.0, 1).clamp(0.0, 100.0))
            }
            _ => Err(mismatch(self.strategy(), seeker, provider)),
        }
    }

    fn strategy(&self) -> ScoringStrategy {
        ScoringStrategy::Cosine
    }
}

fn mismatch(strategy: ScoringStrategy, seeker: &TraitProfile, provider: &TraitProfile) -> AppError {
    AppError::StrategyMismatch(format!(
        "{strategy} scorer cannot compare a {} profile with a {} profile",
        seeker.kind(),
        provider.kind()
    ))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn traits(pairs: &[(&str, f64)]) -> TraitProfile {
        TraitProfile::Traits(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn vector(values: &[f64]) -> TraitProfile {
        TraitProfile::Vector(values.to_vec())
    }

    #[test]
    fn test_difference_opposite_extremes_score_zero() {
        let score = DifferenceScorer
            .score(&traits(&[("warmth", 1.0)]), &traits(&[("warmth", 0.0)]))
            .unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_difference_identical_profiles_score_hundred() {
        let p = traits(&[("warmth", 0.8), ("focus", 0.2)]);
        assert_eq!(DifferenceScorer.score(&p, &p.clone()).unwrap(), 100.0);
    }

    #[test]
    fn test_difference_missing_trait_defaults_to_neutral() {
        // warmth: 1 − |1.0 − 0.5| = 0.5 ; focus: 1 − |0.5 − 0.5| = 1.0 → 75.0
        let score = DifferenceScorer
            .score(&traits(&[("warmth", 1.0)]), &traits(&[("focus", 0.5)]))
            .unwrap();
        assert_eq!(score, 75.0);
    }

    #[test]
    fn test_difference_rounds_to_two_decimals() {
        // 1 − 1/3 = 0.6666… → 66.67
        let score = DifferenceScorer
            .score(&traits(&[("a", 0.0)]), &traits(&[("a", 1.0 / 3.0)]))
            .unwrap();
        assert_eq!(score, 66.67);
    }

    #[test]
    fn test_difference_empty_profile_scores_zero() {
        let score = DifferenceScorer
            .score(&traits(&[]), &traits(&[("warmth", 0.4)]))
            .unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_cosine_identical_vectors_score_hundred() {
        let v = vector(&[1.0, 0.5, -0.3, 0.7, 0.2]);
        assert_eq!(CosineScorer.score(&v, &v.clone()).unwrap(), 100.0);
    }

    #[test]
    fn test_cosine_scenario_profiles_score_hundred() {
        let v = vector(&[0.8, 0.2]);
        assert_eq!(CosineScorer.score(&v, &vector(&[0.8, 0.2])).unwrap(), 100.0);
    }

    #[test]
    fn test_cosine_negated_vectors_score_zero() {
        let score = CosineScorer
            .score(&vector(&[1.0, 1.0, 1.0]), &vector(&[-1.0, -1.0, -1.0]))
            .unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_cosine_orthogonal_vectors_score_fifty() {
        let score = CosineScorer
            .score(&vector(&[1.0, 0.0]), &vector(&[0.0, 1.0]))
            .unwrap();
        assert_eq!(score, 50.0);
    }

    #[test]
    fn test_cosine_zero_magnitude_scores_zero() {
        let score = CosineScorer
            .score(&vector(&[0.0, 0.0]), &vector(&[1.0, 0.5]))
            .unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_cosine_length_mismatch_scores_zero() {
        let score = CosineScorer
            .score(&vector(&[1.0, 0.0]), &vector(&[1.0, 0.0, 0.0]))
            .unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_mixed_profile_kinds_are_strategy_mismatch() {
        let err = DifferenceScorer
            .score(&traits(&[("a", 0.5)]), &vector(&[0.5]))
            .unwrap_err();
        assert!(matches!(err, AppError::StrategyMismatch(_)));
        let err = CosineScorer
            .score(&traits(&[("a", 0.5)]), &vector(&[0.5]))
            .unwrap_err();
        assert!(matches!(err, AppError::StrategyMismatch(_)));
    }

    #[test]
    fn test_scores_bounded_0_to_100() {
        let pairs = [
            (vector(&[0.5, 0.3, -0.2, 0.7, 0.1]), vector(&[0.3, 0.6, 0.1, -0.4, 0.5])),
            (vector(&[-1.0, 0.0]), vector(&[1.0, 0.2])),
        ];
        for (a, b) in &pairs {
            let s = CosineScorer.score(a, b).unwrap();
            assert!((0.0..=100.0).contains(&s), "score {s} out of range");
        }
        let s = DifferenceScorer
            .score(&traits(&[("a", 2.0)]), &traits(&[("a", -3.0)]))
            .unwrap();
        assert!((0.0..=100.0).contains(&s));
    }

    #[test]
    fn test_scorer_for_matches_strategy() {
        assert_eq!(
            scorer_for(ScoringStrategy::Cosine).strategy(),
            ScoringStrategy::Cosine
        );
        assert_eq!(
            scorer_for(ScoringStrategy::Difference).strategy(),
            ScoringStrategy::Difference
        );
    }
}
