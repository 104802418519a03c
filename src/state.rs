use crate::bridge::BackgroundEvent;
use crate::engine::progress::ProgressEvent;
use crate::engine::{DeletionSummary, OutcomeKind};
use crate::gmail::DeleteMode;
use crate::scheduler::{JobKind, JobRequest};
use chrono::{DateTime, Local, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPhase {
    Idle,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRecord {
    pub count: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct AppState {
    // Job settings
    pub query: String,
    pub continuous: bool,
    pub oldest_first: bool,
    pub delete_mode: DeleteMode,

    // State
    pub phase: AppPhase,
    pub job_id: Option<u64>,
    pub active_query: String,

    // Progress
    pub deleted_total: usize,
    pub batches: Vec<BatchRecord>,
    pub status_message: String,

    // Results
    pub last_summary: Option<DeletionSummary>,
    pub next_available_at: Option<DateTime<Utc>>,

    // Errors
    pub error_message: Option<String>,
}

impl AppState {
    pub fn new(default_query: &str) -> Self {
        Self {
            query: default_query.to_string(),
            continuous: false,
            oldest_first: false,
            delete_mode: DeleteMode::Permanent,
            phase: AppPhase::Idle,
            job_id: None,
            active_query: String::new(),
            deleted_total: 0,
            batches: Vec::new(),
            status_message: String::new(),
            last_summary: None,
            next_available_at: None,
            error_message: None,
        }
    }

    pub fn busy(&self) -> bool {
        self.phase != AppPhase::Idle
    }

    pub fn can_start(&self) -> bool {
        !self.busy() && !self.query.trim().is_empty()
    }

    pub fn query_request(&self) -> JobRequest {
        JobRequest {
            kind: JobKind::Query {
                query: self.query.trim().to_string(),
                continuous: self.continuous,
                oldest_first: self.oldest_first,
            },
            delete_mode: self.delete_mode,
        }
    }

    pub fn category_request(&self, label: &str) -> JobRequest {
        JobRequest {
            kind: JobKind::Category {
                label: label.to_string(),
            },
            delete_mode: self.delete_mode,
        }
    }

    /// Marks a start request as sent; the reply arrives as an event.
    pub fn begin_start(&mut self) {
        self.phase = AppPhase::Starting;
        self.error_message = None;
        self.next_available_at = None;
        self.status_message = "Starting deletion...".to_string();
    }

    pub fn retry_hint(&self) -> Option<String> {
        self.next_available_at.map(|at| {
            format!(
                "Next batch allowed at {}",
                at.with_timezone(&Local).format("%H:%M:%S")
            )
        })
    }

    pub fn apply(&mut self, event: BackgroundEvent) {
        match event {
            BackgroundEvent::Progress(ProgressEvent::JobStarted { job_id, query }) => {
                self.phase = AppPhase::Running;
                self.job_id = Some(job_id);
                self.status_message = format!("Deleting emails matching {query}");
                self.active_query = query;
                self.deleted_total = 0;
                self.batches.clear();
            }
            BackgroundEvent::Progress(ProgressEvent::BatchDeleted { count, total }) => {
                self.deleted_total = total;
                self.batches.push(BatchRecord { count, total });
                self.status_message = format!("Deleted {count} emails (Total: {total})");
            }
            BackgroundEvent::Progress(ProgressEvent::JobStopped { message }) => {
                if self.phase == AppPhase::Running {
                    self.phase = AppPhase::Stopping;
                }
                self.status_message = message;
            }
            BackgroundEvent::Progress(ProgressEvent::JobFinished { job_id, summary }) => {
                if self.job_id != Some(job_id) {
                    return;
                }
                self.phase = AppPhase::Idle;
                self.deleted_total = summary.total_deleted;
                self.status_message.clone_from(&summary.message);
                if summary.kind.is_fatal() {
                    self.error_message = Some(summary.message.clone());
                } else if summary.kind == OutcomeKind::Throttled {
                    self.error_message = None;
                }
                self.last_summary = Some(summary);
            }
            BackgroundEvent::Rejected(rejection) => {
                if self.phase == AppPhase::Starting {
                    self.phase = AppPhase::Idle;
                }
                self.next_available_at = rejection.next_available_at;
                self.error_message = Some(rejection.message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{RejectReason, Rejection};

    fn summary(kind: OutcomeKind, total: usize, message: &str) -> DeletionSummary {
        DeletionSummary {
            kind,
            message: message.to_string(),
            total_deleted: total,
            pages: 1,
            deleted_ids: Vec::new(),
        }
    }

    fn progress(event: ProgressEvent) -> BackgroundEvent {
        BackgroundEvent::Progress(event)
    }

    #[test]
    fn job_lifecycle_updates_progress() {
        let mut state = AppState::new("subject:unsubscribe");
        assert!(state.can_start());

        state.begin_start();
        assert!(!state.can_start());

        state.apply(progress(ProgressEvent::JobStarted {
            job_id: 3,
            query: "subject:unsubscribe".to_string(),
        }));
        state.apply(progress(ProgressEvent::BatchDeleted { count: 20, total: 20 }));
        state.apply(progress(ProgressEvent::BatchDeleted { count: 5, total: 25 }));
        assert_eq!(state.phase, AppPhase::Running);
        assert_eq!(state.deleted_total, 25);
        assert_eq!(state.batches.len(), 2);

        state.apply(progress(ProgressEvent::JobFinished {
            job_id: 3,
            summary: summary(OutcomeKind::Completed, 25, "25 emails deleted successfully"),
        }));
        assert_eq!(state.phase, AppPhase::Idle);
        assert_eq!(state.status_message, "25 emails deleted successfully");
        assert!(state.error_message.is_none());
    }

    #[test]
    fn stop_then_finish_returns_to_idle() {
        let mut state = AppState::new("x");
        state.apply(progress(ProgressEvent::JobStarted {
            job_id: 1,
            query: "x".to_string(),
        }));
        state.apply(progress(ProgressEvent::JobStopped {
            message: "Deletion process stopped.".to_string(),
        }));
        assert_eq!(state.phase, AppPhase::Stopping);

        state.apply(progress(ProgressEvent::JobFinished {
            job_id: 1,
            summary: summary(OutcomeKind::StoppedByUser, 10, "Deletion stopped by user."),
        }));
        assert_eq!(state.phase, AppPhase::Idle);
        assert_eq!(state.deleted_total, 10);
    }

    #[test]
    fn fatal_summary_is_shown_as_error() {
        let mut state = AppState::new("x");
        state.apply(progress(ProgressEvent::JobStarted {
            job_id: 1,
            query: "x".to_string(),
        }));
        state.apply(progress(ProgressEvent::JobFinished {
            job_id: 1,
            summary: summary(OutcomeKind::Unreachable, 0, "Error: No internet connection."),
        }));
        assert_eq!(state.error_message.as_deref(), Some("Error: No internet connection."));
    }

    #[test]
    fn quota_rejection_keeps_structured_retry_time() {
        let mut state = AppState::new("x");
        state.begin_start();
        let next = Utc::now();
        state.apply(BackgroundEvent::Rejected(Rejection {
            reason: RejectReason::QuotaExhausted,
            message: "Rate limit exceeded.".to_string(),
            next_available_at: Some(next),
        }));

        assert_eq!(state.phase, AppPhase::Idle);
        assert_eq!(state.next_available_at, Some(next));
        assert!(state.retry_hint().unwrap().starts_with("Next batch allowed at"));
    }

    #[test]
    fn busy_rejection_keeps_the_running_job() {
        let mut state = AppState::new("x");
        state.apply(progress(ProgressEvent::JobStarted {
            job_id: 1,
            query: "x".to_string(),
        }));
        state.apply(BackgroundEvent::Rejected(Rejection {
            reason: RejectReason::Busy,
            message: "Deletion is already in progress.".to_string(),
            next_available_at: None,
        }));
        assert_eq!(state.phase, AppPhase::Running);
    }

    #[test]
    fn requests_follow_the_form() {
        let mut state = AppState::new(" in:spam ");
        state.continuous = true;
        state.delete_mode = DeleteMode::Trash;

        let request = state.query_request();
        assert_eq!(request.query(), "in:spam");
        assert_eq!(request.delete_mode, DeleteMode::Trash);
        assert!(matches!(request.kind, JobKind::Query { continuous: true, .. }));

        assert_eq!(state.category_request("Updates").query(), "category:updates");
    }
}
