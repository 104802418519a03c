use crate::config::GmailConfig;
use crate::error::AppError;
use crate::gmail::token::{refresh_access_token, StoredToken, TokenError, TokenStore};
use crate::gmail::{GatewayError, MailGateway, MessageRef};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Option<Vec<MessageRef>>,
}

/// Google API error envelope: `{"error": {"errors": [{"reason": ...}]}}`.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

impl ErrorEnvelope {
    fn is_rate_limited(&self) -> bool {
        self.error
            .errors
            .iter()
            .any(|e| matches!(e.reason.as_str(), "rateLimitExceeded" | "userRateLimitExceeded"))
    }
}

/// Gmail REST gateway authenticated with a refreshed OAuth access token.
#[derive(Debug)]
pub struct GmailClient {
    http: Client,
    api_base: String,
    token_url: String,
    user_id: String,
    client_id: String,
    client_secret: String,
    bootstrap_refresh_token: Option<String>,
    store: TokenStore,
    cached: Mutex<Option<StoredToken>>,
}

impl GmailClient {
    pub fn new(config: &GmailConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token_url: config.token_url.clone(),
            user_id: config.user_id.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            bootstrap_refresh_token: config.refresh_token.clone(),
            store: TokenStore::new(&config.token_path),
            cached: Mutex::new(None),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/users/{}/messages", self.api_base, self.user_id)
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        let known = match cached.take() {
            Some(token) => Some(token),
            None => self
                .store
                .load(&self.user_id)
                .map_err(|e| GatewayError::AuthRequired(e.to_string()))?,
        };
        if let Some(token) = known.as_ref() {
            if !token.is_expired() {
                let access = token.access_token.clone();
                *cached = known;
                return Ok(access);
            }
        }

        let refresh_token = known
            .map(|t| t.refresh_token)
            .or_else(|| self.bootstrap_refresh_token.clone())
            .ok_or_else(|| {
                GatewayError::AuthRequired(format!(
                    "no token stored for {} in {}",
                    self.user_id,
                    self.store.path().display()
                ))
            })?;
        if self.client_id.is_empty() {
            return Err(GatewayError::AuthRequired(
                "GMAIL_CLIENT_ID is not configured".to_string(),
            ));
        }

        let fresh = refresh_access_token(
            &self.http,
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            &refresh_token,
        )
        .await
        .map_err(|e| match e {
            TokenError::Network(err) if err.is_connect() => {
                GatewayError::Unreachable(err.to_string())
            }
            other => GatewayError::AuthRequired(other.to_string()),
        })?;

        if let Err(e) = self.store.save(&self.user_id, &fresh) {
            warn!("Failed to persist refreshed token: {}", e);
        }
        let access = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let token = self.access_token().await?;
        let resp = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
        }
        Err(classify_status(status, &body))
    }

    /// Marks the current access token as expired, in memory and on disk, so
    /// the next call refreshes it instead of resending the rejected one.
    async fn invalidate_token(&self) {
        let mut cached = self.cached.lock().await;
        let current = match cached.take() {
            Some(token) => Some(token),
            None => self.store.load(&self.user_id).ok().flatten(),
        };
        let Some(mut token) = current else {
            return;
        };

        warn!("Access token for {} was rejected, refreshing on next call", self.user_id);
        token.expires_at = None;
        if let Err(e) = self.store.save(&self.user_id, &token) {
            warn!("Failed to persist token invalidation: {}", e);
        }
        *cached = Some(token);
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_connect() {
        GatewayError::Unreachable(e.to_string())
    } else {
        GatewayError::Unknown(e.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> GatewayError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => GatewayError::Throttled(body.to_string()),
        // Gmail reports per-user quota exhaustion as a 403.
        StatusCode::FORBIDDEN
            if serde_json::from_str::<ErrorEnvelope>(body)
                .is_ok_and(|envelope| envelope.is_rate_limited()) =>
        {
            GatewayError::Throttled(body.to_string())
        }
        StatusCode::UNAUTHORIZED => GatewayError::AuthRequired(body.to_string()),
        _ => GatewayError::Unknown(format!("{status}: {body}")),
    }
}

#[async_trait]
impl MailGateway for GmailClient {
    async fn list(&self, query: &str) -> Result<Vec<MessageRef>, GatewayError> {
        let request = self.http.get(self.messages_url()).query(&[("q", query)]);
        let resp = self.send(request).await?;
        let page: ListResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Unknown(format!("malformed list response: {e}")))?;

        let messages = page.messages.unwrap_or_default();
        debug!("Listed {} messages for {:?}", messages.len(), query);
        Ok(messages)
    }

    async fn delete(&self, id: &str) -> Result<(), GatewayError> {
        let url = format!("{}/{}", self.messages_url(), id);
        self.send(self.http.delete(url)).await?;
        Ok(())
    }

    async fn trash(&self, id: &str) -> Result<(), GatewayError> {
        let url = format!("{}/{}/trash", self.messages_url(), id);
        self.send(self.http.post(url)).await?;
        Ok(())
    }

    async fn authorize(&self) -> Result<(), GatewayError> {
        self.access_token().await.map(|_| ())
    }
}
