mod admin;
mod config;
mod conversation;
mod errors;
mod matching;
mod models;
mod notify;
mod questionnaire;
mod routes;
mod state;
mod store;
mod users;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::conversation::session::{MemorySessionStore, RedisSessionStore, SessionStore};
use crate::matching::scorer::scorer_for;
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::questionnaire::Questionnaire;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{MatchStore, MemoryStore, PgMatchStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Matchmaker API v{}", env!("CARGO_PKG_VERSION"));

    // Questionnaire and scorer share one strategy
    let questionnaire = Questionnaire::load(
        Path::new(&config.questionnaire_path),
        config.scoring_strategy,
    )
    .context("Failed to load questionnaire")?;
    let scorer = scorer_for(config.scoring_strategy);
    if !config.scoring_enabled {
        warn!("Scoring disabled: providers are listed in registration order");
    }

    // Initialize the match store
    let store: Arc<dyn MatchStore> = match &config.database_url {
        Some(url) => Arc::new(
            PgMatchStore::connect(url, 10)
                .await
                .context("Failed to initialise PostgreSQL store")?,
        ),
        None => {
            warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // Initialize the session store
    let sessions: Arc<dyn SessionStore> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            info!("Redis session store initialized (ttl {}s)", config.session_ttl_secs);
            Arc::new(RedisSessionStore::new(client, config.session_ttl_secs))
        }
        None => {
            warn!("REDIS_URL not set, conversation sessions are kept in memory");
            Arc::new(MemorySessionStore::new())
        }
    };

    // Initialize the notifier
    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            info!("Match events are delivered to {url}");
            Arc::new(WebhookNotifier::new(url.clone())?)
        }
        None => Arc::new(LogNotifier),
    };

    info!(
        "Admin allow-list has {} entr{}",
        config.admin_allowlist.len(),
        if config.admin_allowlist.len() == 1 { "y" } else { "ies" }
    );

    // Build app state
    let state = AppState {
        store,
        sessions,
        notifier,
        scorer,
        questionnaire: Arc::new(questionnaire),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
