use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::info;

use crate::errors::AppError;
use crate::matching::aggregator::AcceptedAnswer;
use crate::models::ledger::{AdminStats, CompatibilityScore, Like, Match};
use crate::models::user::{NewUser, Role, TraitProfile, User};
use crate::store::{MatchStore, ProfileUpdate};

const SCHEMA: [&str; 7] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        external_id BIGINT NOT NULL UNIQUE,
        role TEXT NOT NULL CHECK (role IN ('seeker', 'provider')),
        contact TEXT,
        about TEXT,
        test_completed BOOLEAN NOT NULL DEFAULT FALSE,
        trait_profile JSONB,
        blocked BOOLEAN NOT NULL DEFAULT FALSE,
        registered_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_active_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS answers (
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        question_id TEXT NOT NULL,
        value BIGINT NOT NULL,
        answered_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (user_id, question_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS compatibility_scores (
        seeker_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        provider_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        score DOUBLE PRECISION NOT NULL CHECK (score >= 0 AND score <= 100),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (seeker_id, provider_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS likes (
        seq BIGSERIAL,
        liker_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        liked_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (liker_id, liked_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS matches (
        seeker_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        provider_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (seeker_id, provider_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS browse_cursors (
        seeker_id BIGINT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
        current_index BIGINT NOT NULL DEFAULT 0 CHECK (current_index >= 0)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS likes_liked_idx ON likes (liked_id, created_at DESC)",
];

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    external_id: i64,
    role: String,
    contact: Option<String>,
    about: Option<String>,
    test_completed: bool,
    trait_profile: Option<Json<TraitProfile>>,
    blocked: bool,
    registered_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            external_id: row.external_id,
            role: row.role.parse::<Role>()?,
            contact: row.contact,
            about: row.about,
            test_completed: row.test_completed,
            trait_profile: row.trait_profile.map(|Json(p)| p),
            blocked: row.blocked,
            registered_at: row.registered_at,
            last_active_at: row.last_active_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ScoredUserRow {
    #[sqlx(flatten)]
    user: UserRow,
    score: f64,
}

#[derive(Debug, FromRow)]
struct LikerRow {
    #[sqlx(flatten)]
    user: UserRow,
    liked_id: i64,
    liked_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = "u.id, u.external_id, u.role, u.contact, u.about, u.test_completed, \
     u.trait_profile, u.blocked, u.registered_at, u.last_active_at";

/// Postgres-backed store. Uniqueness of likes, matches and scores is enforced by
/// primary keys; writes use `ON CONFLICT` instead of read-then-write.
#[derive(Clone)]
pub struct PgMatchStore {
    pool: PgPool,
}

impl PgMatchStore {
    /// Opens a connection pool and prepares the schema.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        info!("PostgreSQL connection pool established");
        Self::from_pool(pool).await
    }

    /// Wraps an existing pool and creates the schema if it is missing.
    pub async fn from_pool(pool: PgPool) -> Result<Self, AppError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), AppError> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        info!("Match store schema ready");
        Ok(())
    }
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (external_id, role, contact)
            VALUES ($1, $2, $3)
            RETURNING id, external_id, role, contact, about, test_completed,
                      trait_profile, blocked, registered_at, last_active_at
            "#,
        )
        .bind(new_user.external_id)
        .bind(new_user.role.as_str())
        .bind(new_user.contact)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Validation(
                format!("External id {} is already registered", new_user.external_id),
            ),
            other => AppError::Database(other),
        })?;
        row.try_into()
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(User::try_from).transpose()
    }

    async fn get_user_by_external(&self, external_id: i64) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn update_profile(&self, id: i64, update: ProfileUpdate) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET contact = COALESCE($1, contact),
                about = COALESCE($2, about),
                last_active_at = now()
            WHERE id = $3
            "#,
        )
        .bind(update.contact)
        .bind(update.about)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn touch_last_active(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_active_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_blocked(&self, id: i64, blocked: bool) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET blocked = $1 WHERE id = $2")
            .bind(blocked)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        // Answers, scores, likes, matches and the cursor go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn save_test_results(
        &self,
        id: i64,
        profile: &TraitProfile,
        answers: &[AcceptedAnswer],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        // The UPDATE takes the row lock first, so concurrent completions for the same
        // user serialize and the last writer wins with a consistent answer set.
        let updated = sqlx::query(
            r#"
            UPDATE users
            SET trait_profile = $1, test_completed = TRUE, last_active_at = now()
            WHERE id = $2
            "#,
        )
        .bind(Json(profile))
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {id} not found")));
        }

        sqlx::query("DELETE FROM answers WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for answer in answers {
            sqlx::query("INSERT INTO answers (user_id, question_id, value) VALUES ($1, $2, $3)")
                .bind(id)
                .bind(&answer.question_id)
                .bind(answer.value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_answers(&self, id: i64) -> Result<Vec<AcceptedAnswer>, AppError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT question_id, value FROM answers WHERE user_id = $1 ORDER BY question_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(question_id, value)| AcceptedAnswer { question_id, value })
            .collect())
    }

    async fn list_users(&self, role: Role) -> Result<Vec<User>, AppError> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.role = $1 \
             ORDER BY u.registered_at ASC, u.id ASC"
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn upsert_score(
        &self,
        seeker_id: i64,
        provider_id: i64,
        score: f64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO compatibility_scores (seeker_id, provider_id, score, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (seeker_id, provider_id) DO UPDATE
            SET score = EXCLUDED.score, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(seeker_id)
        .bind(provider_id)
        .bind(score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_score(
        &self,
        seeker_id: i64,
        provider_id: i64,
    ) -> Result<Option<CompatibilityScore>, AppError> {
        Ok(sqlx::query_as::<_, CompatibilityScore>(
            r#"
            SELECT seeker_id, provider_id, score, updated_at
            FROM compatibility_scores
            WHERE seeker_id = $1 AND provider_id = $2
            "#,
        )
        .bind(seeker_id)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_like(&self, liker_id: i64, liked_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO likes (liker_id, liked_id)
            VALUES ($1, $2)
            ON CONFLICT (liker_id, liked_id) DO NOTHING
            "#,
        )
        .bind(liker_id)
        .bind(liked_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn has_like(&self, liker_id: i64, liked_id: i64) -> Result<bool, AppError> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM likes WHERE liker_id = $1 AND liked_id = $2)",
        )
        .bind(liker_id)
        .bind(liked_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn ensure_match(&self, seeker_id: i64, provider_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO matches (seeker_id, provider_id)
            VALUES ($1, $2)
            ON CONFLICT (seeker_id, provider_id) DO NOTHING
            "#,
        )
        .bind(seeker_id)
        .bind(provider_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_match(
        &self,
        seeker_id: i64,
        provider_id: i64,
    ) -> Result<Option<Match>, AppError> {
        Ok(sqlx::query_as::<_, Match>(
            "SELECT seeker_id, provider_id, created_at FROM matches \
             WHERE seeker_id = $1 AND provider_id = $2",
        )
        .bind(seeker_id)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn scored_providers(
        &self,
        seeker_id: i64,
        include_blocked: bool,
    ) -> Result<Vec<(User, f64)>, AppError> {
        let rows: Vec<ScoredUserRow> = sqlx::query_as(&format!(
            r#"
            SELECT {USER_COLUMNS}, s.score
            FROM compatibility_scores s
            JOIN users u ON u.id = s.provider_id
            WHERE s.seeker_id = $1
              AND u.role = 'provider'
              AND u.test_completed
              AND ($2 OR NOT u.blocked)
            ORDER BY s.score DESC, u.registered_at ASC, u.id ASC
            "#
        ))
        .bind(seeker_id)
        .bind(include_blocked)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| Ok((User::try_from(row.user)?, row.score)))
            .collect()
    }

    async fn get_cursor(&self, seeker_id: i64) -> Result<Option<i64>, AppError> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT current_index FROM browse_cursors WHERE seeker_id = $1",
        )
        .bind(seeker_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_cursor(&self, seeker_id: i64, index: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO browse_cursors (seeker_id, current_index)
            VALUES ($1, $2)
            ON CONFLICT (seeker_id) DO UPDATE SET current_index = EXCLUDED.current_index
            "#,
        )
        .bind(seeker_id)
        .bind(index.max(0))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn likes_received(&self, user_id: i64) -> Result<Vec<(User, Like)>, AppError> {
        let rows: Vec<LikerRow> = sqlx::query_as(&format!(
            r#"
            SELECT {USER_COLUMNS}, l.liked_id, l.created_at AS liked_at
            FROM likes l
            JOIN users u ON u.id = l.liker_id
            WHERE l.liked_id = $1
            ORDER BY l.created_at DESC, l.seq DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let like = Like {
                    liker_id: row.user.id,
                    liked_id: row.liked_id,
                    created_at: row.liked_at,
                };
                Ok((User::try_from(row.user)?, like))
            })
            .collect()
    }

    async fn stats(&self, active_since: DateTime<Utc>) -> Result<AdminStats, AppError> {
        let (providers, seekers, active_seekers, active_providers): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE role = 'provider'),
                    COUNT(*) FILTER (WHERE role = 'seeker'),
                    COUNT(*) FILTER (WHERE role = 'seeker' AND last_active_at >= $1),
                    COUNT(*) FILTER (WHERE role = 'provider' AND last_active_at >= $1)
                FROM users
                "#,
            )
            .bind(active_since)
            .fetch_one(&self.pool)
            .await?;

        let (matches_total, matches_recent): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE created_at >= $1) FROM matches",
        )
        .bind(active_since)
        .fetch_one(&self.pool)
        .await?;

        Ok(AdminStats {
            providers,
            seekers,
            active_total: active_seekers + active_providers,
            active_seekers,
            active_providers,
            matches_total,
            matches_recent,
        })
    }
}
