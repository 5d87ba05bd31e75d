use std::sync::Arc;

use crate::config::Config;
use crate::conversation::session::SessionStore;
use crate::matching::scorer::CompatibilityScorer;
use crate::matching::RankingMode;
use crate::notify::Notifier;
use crate::questionnaire::Questionnaire;
use crate::store::MatchStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Postgres when `DATABASE_URL` is set, otherwise in-memory.
    pub store: Arc<dyn MatchStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub notifier: Arc<dyn Notifier>,
    /// Matches the questionnaire's strategy.
    pub scorer: Arc<dyn CompatibilityScorer>,
    pub questionnaire: Arc<Questionnaire>,
    pub config: Config,
}

impl AppState {
    pub fn ranking_mode(&self) -> RankingMode {
        if self.config.scoring_enabled {
            RankingMode::Scored
        } else {
            RankingMode::RegistrationOrder
        }
    }
}
