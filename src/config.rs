use crate::engine::quota::QuotaSettings;
use crate::engine::EngineSettings;
use crate::error::AppError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_QUERY: &str = "subject:unsubscribe";

#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Used only when the token file has no record for `user_id` yet.
    pub refresh_token: Option<String>,
    pub user_id: String,
    pub token_path: PathBuf,
    pub api_base: String,
    pub token_url: String,
    pub http_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gmail: GmailConfig,
    pub engine: EngineSettings,
    pub quota: QuotaSettings,
    pub default_query: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let token_path = match get("GMAIL_TOKEN_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_token_path(),
        };

        let batch_size: usize = parse_or(&get, "PURGE_BATCH_SIZE", 20)?;
        if batch_size == 0 {
            return Err(AppError::Config(
                "PURGE_BATCH_SIZE must be at least 1".to_string(),
            ));
        }

        let engine = EngineSettings {
            batch_size,
            batch_delay: Duration::from_millis(parse_or(&get, "PURGE_BATCH_DELAY_MS", 500)?),
            throttle_cooldown: Duration::from_secs(parse_or(
                &get,
                "PURGE_THROTTLE_COOLDOWN_SECS",
                60,
            )?),
            ..EngineSettings::default()
        };

        let quota = QuotaSettings {
            max_per_window: parse_or(&get, "PURGE_QUOTA_MAX", 150)?,
            window: Duration::from_secs(parse_or(&get, "PURGE_QUOTA_WINDOW_SECS", 3600)?),
        };
        if quota.window.is_zero() {
            return Err(AppError::Config(
                "PURGE_QUOTA_WINDOW_SECS must be positive".to_string(),
            ));
        }

        let gmail = GmailConfig {
            client_id: get("GMAIL_CLIENT_ID").unwrap_or_default(),
            client_secret: get("GMAIL_CLIENT_SECRET").unwrap_or_default(),
            refresh_token: get("GMAIL_REFRESH_TOKEN"),
            user_id: get("GMAIL_USER_ID").unwrap_or_else(|| "me".to_string()),
            token_path,
            api_base: get("GMAIL_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            token_url: get("GMAIL_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            http_timeout: Duration::from_secs(parse_or(&get, "PURGE_HTTP_TIMEOUT_SECS", 30)?),
        };

        Ok(Self {
            gmail,
            engine,
            quota,
            default_query: get("PURGE_DEFAULT_QUERY").unwrap_or_else(|| DEFAULT_QUERY.to_string()),
        })
    }
}

fn default_token_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gmail-purge")
        .join("tokens.json")
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}
