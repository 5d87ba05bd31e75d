//! Notification boundary: the engine emits `MatchEvent`s, delivery is external.
//!
//! `LogNotifier` only records events through `tracing`.
//! `WebhookNotifier` POSTs each event as JSON to a configured URL, where a chat bot
//! or mailer turns it into a message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    LikeReceived {
        from: i64,
        to: i64,
        score: Option<f64>,
    },
    MutualMatch {
        seeker: i64,
        provider: i64,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &MatchEvent) -> Result<(), AppError>;
}

/// Delivers an event and swallows failures: a lost notification must never undo
/// the like that produced it.
pub async fn dispatch(notifier: &dyn Notifier, event: MatchEvent) {
    if let Err(e) = notifier.notify(&event).await {
        warn!("Dropping notification {event:?}: {e}");
    }
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &MatchEvent) -> Result<(), AppError> {
        match event {
            MatchEvent::LikeReceived { from, to, score } => {
                info!("event=like_forwarded from_user={from} to_user={to} score={score:?}");
            }
            MatchEvent::MutualMatch { seeker, provider } => {
                info!("event=match_notified seeker_id={seeker} provider_id={provider}");
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Notify(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &MatchEvent) -> Result<(), AppError> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| AppError::Notify(format!("Webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Notify(format!(
                "Webhook returned status {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}
