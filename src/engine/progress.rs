use super::DeletionSummary;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    JobStarted { job_id: u64, query: String },
    /// One chunk settled. `total` is the running total for the job.
    BatchDeleted { count: usize, total: usize },
    JobStopped { message: String },
    JobFinished { job_id: u64, summary: DeletionSummary },
}

/// Push channel for job progress. Implementations must not block and
/// swallow their own delivery failures.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, event: ProgressEvent);
}
