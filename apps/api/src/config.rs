use anyhow::{Context, Result};

use crate::matching::ScoringStrategy;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    /// In-memory store when unset.
    pub database_url: Option<String>,
    /// In-memory sessions when unset.
    pub redis_url: Option<String>,
    pub questionnaire_path: String,
    pub scoring_strategy: ScoringStrategy,
    /// `false` ranks providers in registration order without scores.
    pub scoring_enabled: bool,
    pub admin_allowlist: Vec<i64>,
    pub notify_webhook_url: Option<String>,
    pub session_ttl_secs: u64,
    pub active_window_hours: i64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: optional_env("DATABASE_URL"),
            redis_url: optional_env("REDIS_URL"),
            questionnaire_path: require_env("QUESTIONNAIRE_PATH")?,
            scoring_strategy: optional_env("SCORING_STRATEGY")
                .map(|s| s.parse::<ScoringStrategy>())
                .transpose()?
                .unwrap_or_default(),
            scoring_enabled: parse_bool(
                "SCORING_ENABLED",
                optional_env("SCORING_ENABLED").as_deref(),
                true,
            )?,
            admin_allowlist: parse_allowlist(&optional_env("ADMIN_ALLOWLIST").unwrap_or_default())?,
            notify_webhook_url: optional_env("NOTIFY_WEBHOOK_URL"),
            session_ttl_secs: parse_or("SESSION_TTL_SECS", 86_400)?,
            active_window_hours: parse_or("ACTIVE_WINDOW_HOURS", 24)?,
            port: parse_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank are the same.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: Option<&str>, default: bool) -> Result<bool> {
    match raw.map(|v| v.to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("{key} must be a boolean, got '{v}'"),
        },
    }
}

/// Comma-separated admin ids. Empty entries are skipped; anything non-numeric
/// is an error.
pub fn parse_allowlist(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<i64>()
                .with_context(|| format!("ADMIN_ALLOWLIST entry '{entry}' is not a numeric id"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_parsing() {
        assert_eq!(parse_allowlist("12, 34,,56 ").unwrap(), vec![12, 34, 56]);
        assert!(parse_allowlist("").unwrap().is_empty());
    }

    #[test]
    fn test_allowlist_rejects_non_numeric() {
        assert!(parse_allowlist("12,admin").is_err());
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("X", None, true).unwrap());
        assert!(!parse_bool("X", Some("False"), true).unwrap());
        assert!(parse_bool("X", Some("1"), false).unwrap());
        assert!(parse_bool("X", Some("maybe"), true).is_err());
    }
}
