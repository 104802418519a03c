//! Batched, throttled, cooperatively cancelable deletion.
//!
//! A [`DeletionEngine`] is created per job. It owns the job's running total
//! and shares a [`RunFlag`] with the scheduler, which clears it on a stop
//! request. The flag is only consulted at chunk and page boundaries, so
//! deletes already in flight always settle.

mod batch;
mod drain;
pub mod progress;
pub mod quota;

pub use drain::category_query;

use crate::gmail::{DeleteMode, GatewayError, MailGateway};
use progress::ProgressSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const STOPPED_BY_USER: &str = "Deletion stopped by user.";
pub(crate) const NO_CONNECTIVITY: &str = "Error: No internet connection. Deletion stopped.";
pub(crate) const RATE_LIMITED: &str = "Rate limit exceeded. Pausing and will retry...";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub batch_size: usize,
    /// Pause after every chunk to stay under the provider's request quota.
    pub batch_delay: Duration,
    /// Pause after the provider answers with a rate-limit response.
    pub throttle_cooldown: Duration,
    pub delete_mode: DeleteMode,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: 20,
            batch_delay: Duration::from_millis(500),
            throttle_cooldown: Duration::from_secs(60),
            delete_mode: DeleteMode::Permanent,
        }
    }
}

/// "Job should continue". Cleared by a stop request or a fatal error.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// All input processed, or the query has no more matches.
    Completed,
    StoppedByUser,
    /// The provider throttled us; the caller may continue.
    Throttled,
    Unreachable,
    Failed,
}

impl OutcomeKind {
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Unreachable | Self::Failed)
    }
}

/// Result of deleting one sequence of messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOutcome {
    pub kind: OutcomeKind,
    pub message: String,
    /// Ids whose delete call succeeded, in chunk order.
    pub deleted_ids: Vec<String>,
}

impl DeletionOutcome {
    fn new(kind: OutcomeKind, message: impl Into<String>, deleted_ids: Vec<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            deleted_ids,
        }
    }
}

/// Result of a whole job, possibly spanning many listed pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionSummary {
    pub kind: OutcomeKind,
    pub message: String,
    pub total_deleted: usize,
    pub pages: usize,
    pub deleted_ids: Vec<String>,
}

pub struct DeletionEngine {
    gateway: Arc<dyn MailGateway>,
    sink: Arc<dyn ProgressSink>,
    settings: EngineSettings,
    run: RunFlag,
    /// Running total for the job, across pages.
    deleted_count: usize,
}

impl std::fmt::Debug for DeletionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionEngine")
            .field("settings", &self.settings)
            .field("run", &self.run.is_set())
            .field("deleted_count", &self.deleted_count)
            .finish_non_exhaustive()
    }
}

impl DeletionEngine {
    pub fn new(
        gateway: Arc<dyn MailGateway>,
        sink: Arc<dyn ProgressSink>,
        settings: EngineSettings,
        run: RunFlag,
    ) -> Self {
        Self {
            gateway,
            sink,
            settings: EngineSettings {
                batch_size: settings.batch_size.max(1),
                ..settings
            },
            run,
            deleted_count: 0,
        }
    }

    async fn remove(&self, id: &str) -> Result<(), GatewayError> {
        match self.settings.delete_mode {
            DeleteMode::Permanent => self.gateway.delete(id).await,
            DeleteMode::Trash => self.gateway.trash(id).await,
        }
    }
}
