use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::conversation::ConversationState;
use crate::errors::AppError;
use crate::models::user::Role;

/// Per-transport-user conversation context, passed explicitly through every call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub external_id: i64,
    /// Set once the user has chosen a role.
    pub user_id: Option<i64>,
    /// Role of `user_id`; selects the question section.
    #[serde(default)]
    pub user_role: Option<Role>,
    #[serde(flatten)]
    pub state: ConversationState,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(external_id: i64) -> Self {
        Self {
            external_id,
            user_id: None,
            user_role: None,
            state: ConversationState::New,
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, external_id: i64) -> Result<Option<Session>, AppError>;

    async fn save(&self, session: &Session) -> Result<(), AppError>;

    async fn clear(&self, external_id: i64) -> Result<(), AppError>;

    /// Exclusive per-user lock for a load → apply → save cycle. Released on drop.
    async fn lock(&self, external_id: i64) -> Result<SessionLock, AppError>;
}

/// Proof that the holder is the only writer of one session.
pub struct SessionLock {
    _held: HeldLock,
}

enum HeldLock {
    Local(OwnedMutexGuard<()>),
    Redis(RedisLease),
}

// ────────────────────────────────────────────────────────────────────────────
// Redis
// ────────────────────────────────────────────────────────────────────────────

/// Sessions as JSON strings under `matchmaker:session:<external_id>`, expiring
/// after `ttl_secs` without activity.
#[derive(Clone)]
pub struct RedisSessionStore {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisSessionStore {
    pub fn new(client: redis::Client, ttl_secs: u64) -> Self {
        Self { client, ttl_secs }
    }

    fn key(external_id: i64) -> String {
        format!("matchmaker:session:{external_id}")
    }

    fn lock_key(external_id: i64) -> String {
        format!("matchmaker:session-lock:{external_id}")
    }
}

/// Lease expiry; a crashed holder blocks the session at most this long.
const LEASE_TTL_MS: u64 = 10_000;
const LEASE_RETRY: Duration = Duration::from_millis(25);
const LEASE_ATTEMPTS: u32 = 200;

/// Deletes the lease only if it still carries our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

static LEASE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn lease_token() -> String {
    format!(
        "{}-{}-{}",
        std::process::id(),
        Utc::now().timestamp_micros(),
        LEASE_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

struct RedisLease {
    client: redis::Client,
    key: String,
    token: String,
}

impl Drop for RedisLease {
    fn drop(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = self.client.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        runtime.spawn(async move {
            if let Err(e) = release_lease(&client, &key, &token).await {
                warn!("Failed to release {key}: {e}");
            }
        });
    }
}

async fn release_lease(client: &redis::Client, key: &str, token: &str) -> Result<(), AppError> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let script = redis::Script::new(RELEASE_SCRIPT);
    script
        .key(key)
        .arg(token)
        .invoke_async::<_, i64>(&mut conn)
        .await?;
    Ok(())
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, external_id: i64) -> Result<Option<Session>, AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(Self::key(external_id)).await?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| AppError::Session(format!("Corrupt session {external_id}: {e}")))
        })
        .transpose()
    }

    async fn save(&self, session: &Session) -> Result<(), AppError> {
        let json = serde_json::to_string(session)
            .map_err(|e| AppError::Session(format!("Cannot encode session: {e}")))?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("SET")
            .arg(Self::key(session.external_id))
            .arg(json)
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await?;
        debug!(
            "Saved session {} in state {}",
            session.external_id,
            session.state.name()
        );
        Ok(())
    }

    async fn clear(&self, external_id: i64) -> Result<(), AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(Self::key(external_id)).await?;
        Ok(())
    }

    async fn lock(&self, external_id: i64) -> Result<SessionLock, AppError> {
        let key = Self::lock_key(external_id);
        let token = lease_token();
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        for _ in 0..LEASE_ATTEMPTS {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(LEASE_TTL_MS)
                .query_async(&mut conn)
                .await?;
            if acquired.is_some() {
                return Ok(SessionLock {
                    _held: HeldLock::Redis(RedisLease {
                        client: self.client.clone(),
                        key,
                        token,
                    }),
                });
            }
            tokio::time::sleep(LEASE_RETRY).await;
        }
        Err(AppError::Session(format!(
            "Session {external_id} is busy, try again"
        )))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory
// ────────────────────────────────────────────────────────────────────────────

/// Process-local sessions without expiry. Used when no Redis URL is configured.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<i64, Session>>,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, external_id: i64) -> Result<Option<Session>, AppError> {
        Ok(self.sessions.lock().await.get(&external_id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), AppError> {
        self.sessions
            .lock()
            .await
            .insert(session.external_id, session.clone());
        Ok(())
    }

    async fn clear(&self, external_id: i64) -> Result<(), AppError> {
        self.sessions.lock().await.remove(&external_id);
        Ok(())
    }

    async fn lock(&self, external_id: i64) -> Result<SessionLock, AppError> {
        let slot = self
            .locks
            .lock()
            .await
            .entry(external_id)
            .or_default()
            .clone();
        Ok(SessionLock {
            _held: HeldLock::Local(slot.lock_owned().await),
        })
    }
}
