// Matching engine: trait aggregation, compatibility scoring, the like/match ledger,
// score recalculation and the browse cursor.
// Storage goes through store::MatchStore, delivery through notify::Notifier.

pub mod aggregator;
pub mod browse;
pub mod handlers;
pub mod ledger;
pub mod recalc;
pub mod scorer;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// System-wide choice of aggregation + scoring. Profiles produced under one
/// strategy are never compared with the other's.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStrategy {
    /// Normalized trait map, scored by mean per-trait difference.
    #[default]
    Difference,
    /// Weighted answer vector, scored by cosine similarity.
    Cosine,
}

impl ScoringStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringStrategy::Difference => "difference",
            ScoringStrategy::Cosine => "cosine",
        }
    }
}

impl fmt::Display for ScoringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoringStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "difference" => Ok(ScoringStrategy::Difference),
            "cosine" => Ok(ScoringStrategy::Cosine),
            other => Err(AppError::Config(format!(
                "Unknown scoring strategy '{other}' (expected 'difference' or 'cosine')"
            ))),
        }
    }
}

/// How `rank_providers_for` orders providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMode {
    /// Descending score, only providers with a completed questionnaire.
    Scored,
    /// Scoring disabled: every provider in registration order, no score.
    RegistrationOrder,
}

/// Visibility policy applied by the ranking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    HideBlocked,
}
