pub mod client;
pub mod token;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// A message handle as returned by a listing. Only the id is needed to delete it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    Trash,
    #[default]
    Permanent,
}

/// Failure kinds a gateway call can report. The engine reacts to the kind,
/// never to the message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("No internet connection: {0}")]
    Unreachable(String),

    #[error("Rate limited by provider: {0}")]
    Throttled(String),

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("Mail API error: {0}")]
    Unknown(String),
}

#[async_trait]
pub trait MailGateway: Send + Sync {
    /// Returns one page of messages matching `query`, using the provider's
    /// default page size.
    async fn list(&self, query: &str) -> Result<Vec<MessageRef>, GatewayError>;

    /// Permanently deletes a message.
    async fn delete(&self, id: &str) -> Result<(), GatewayError>;

    /// Moves a message to the trash.
    async fn trash(&self, id: &str) -> Result<(), GatewayError>;

    /// Checks that credentials are usable before a job starts.
    async fn authorize(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}
