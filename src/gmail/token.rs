use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Seconds shaved off an access token's lifetime so it is never used at the edge.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token file error ({path}): {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Token file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Token endpoint unreachable: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Unknown expiry counts as expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_none_or(|exp| Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) >= exp)
    }
}

/// JSON file holding one token record per user identifier.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self, user_id: &str) -> Result<Option<StoredToken>, TokenError> {
        Ok(self.read_all()?.remove(user_id))
    }

    pub fn save(&self, user_id: &str, token: &StoredToken) -> Result<(), TokenError> {
        let mut records = self.read_all()?;
        records.insert(user_id.to_string(), token.clone());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| TokenError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(&records)?;
        std::fs::write(&self.path, content).map_err(|source| TokenError::Io {
            path: self.path.clone(),
            source,
        })?;
        restrict_permissions(&self.path)?;

        debug!("Saved token for {} to {}", user_id, self.path.display());
        Ok(())
    }

    fn read_all(&self) -> Result<BTreeMap<String, StoredToken>, TokenError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| TokenError::Io {
            path: self.path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), TokenError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|source| {
        TokenError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), TokenError> {
    Ok(())
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Exchanges a refresh token for a fresh access token. Google may or may not
/// rotate the refresh token; the old one is kept when it doesn't.
pub async fn refresh_access_token(
    http: &Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<StoredToken, TokenError> {
    debug!("Refreshing Gmail access token");

    let resp = http
        .post(token_url)
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TokenError::Refresh(format!("{status}: {body}")));
    }

    let payload: RefreshResponse = resp.json().await?;
    Ok(StoredToken {
        access_token: payload.access_token,
        refresh_token: payload
            .refresh_token
            .unwrap_or_else(|| refresh_token.to_string()),
        expires_at: payload
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs)),
    })
}
