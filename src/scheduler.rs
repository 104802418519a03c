use crate::engine::progress::{ProgressEvent, ProgressSink};
use crate::engine::quota::{QuotaSettings, QuotaWindow};
use crate::engine::{category_query, DeletionEngine, DeletionSummary, EngineSettings, RunFlag};
use crate::gmail::{DeleteMode, GatewayError, MailGateway};
use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

const BUSY: &str = "Deletion is already in progress. Please wait or stop the operation.";
const STOPPED: &str = "Deletion process stopped.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl JobStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// Free-form search. One page unless `continuous`.
    Query {
        query: String,
        continuous: bool,
        oldest_first: bool,
    },
    /// Drains a Gmail category such as `promotions` or `updates`.
    Category { label: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub kind: JobKind,
    pub delete_mode: DeleteMode,
}

impl JobRequest {
    pub fn query(&self) -> String {
        match &self.kind {
            JobKind::Query { query, .. } => query.trim().to_string(),
            JobKind::Category { label } => category_query(label),
        }
    }

    /// Category drains are exempt from the local quota window.
    fn counts_against_quota(&self) -> bool {
        matches!(self.kind, JobKind::Query { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Busy,
    QuotaExhausted,
    AuthRequired,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub message: String,
    pub next_available_at: Option<DateTime<Utc>>,
}

impl Rejection {
    fn new(reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            next_available_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartReply {
    Started { job_id: u64 },
    Rejected(Rejection),
}

/// Point-in-time view of the scheduler. Counters describe the last finished
/// job; a running job reports its progress through [`ProgressEvent`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub query: String,
    pub deleted_count: usize,
    pub deleted_ids: Vec<String>,
    pub count_in_window: usize,
    pub last_deletion_at: Option<DateTime<Utc>>,
    pub last_summary: Option<DeletionSummary>,
}

#[derive(Debug)]
enum Command {
    Start {
        request: JobRequest,
        reply: oneshot::Sender<StartReply>,
    },
    Stop,
    Status {
        reply: oneshot::Sender<JobSnapshot>,
    },
}

#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    pub async fn start(&self, request: JobRequest) -> StartReply {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Start { request, reply }).is_err() {
            return StartReply::Rejected(Rejection::new(
                RejectReason::Unavailable,
                "Deletion service has shut down.",
            ));
        }
        rx.await.unwrap_or_else(|_| {
            StartReply::Rejected(Rejection::new(
                RejectReason::Unavailable,
                "Deletion service has shut down.",
            ))
        })
    }

    pub fn stop(&self) {
        if self.tx.send(Command::Stop).is_err() {
            warn!("Stop requested after the scheduler shut down");
        }
    }

    pub async fn status(&self) -> Option<JobSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Status { reply }).ok()?;
        rx.await.ok()
    }
}

struct ActiveJob {
    id: u64,
    run: RunFlag,
    counts_against_quota: bool,
}

/// Owns the single job slot and the quota window. Every state change goes
/// through its command loop, so no locking is needed.
pub struct Scheduler {
    gateway: Arc<dyn MailGateway>,
    sink: Arc<dyn ProgressSink>,
    settings: EngineSettings,
    quota: QuotaWindow,
    status: JobStatus,
    query: String,
    deleted_count: usize,
    deleted_ids: Vec<String>,
    last_summary: Option<DeletionSummary>,
    current: Option<ActiveJob>,
    next_job_id: u64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("status", &self.status)
            .field("query", &self.query)
            .field("quota", &self.quota)
            .finish_non_exhaustive()
    }
}

/// Spawns the scheduler on the current tokio runtime.
pub fn spawn(
    gateway: Arc<dyn MailGateway>,
    sink: Arc<dyn ProgressSink>,
    settings: EngineSettings,
    quota: QuotaSettings,
) -> SchedulerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler {
        gateway,
        sink,
        settings,
        quota: QuotaWindow::new(quota),
        status: JobStatus::Idle,
        query: String::new(),
        deleted_count: 0,
        deleted_ids: Vec::new(),
        last_summary: None,
        current: None,
        next_job_id: 0,
    };
    tokio::spawn(scheduler.run(rx));
    SchedulerHandle { tx }
}

impl Scheduler {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(u64, DeletionSummary)>();
        let period = self.quota.window();
        let mut quota_reset = interval_at(Instant::now() + period, period);
        quota_reset.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(Command::Start { request, reply }) => {
                        let answer = self.start(request, &done_tx).await;
                        // The requester may have given up waiting.
                        let _ = reply.send(answer);
                    }
                    Some(Command::Stop) => self.stop(),
                    Some(Command::Status { reply }) => {
                        let _ = reply.send(self.snapshot());
                    }
                    None => break,
                },
                Some((job_id, summary)) = done_rx.recv() => self.finish(job_id, summary),
                _ = quota_reset.tick() => {
                    info!("Resetting deleted emails count.");
                    self.quota.reset();
                }
            }
        }

        if let Some(job) = self.current.take() {
            job.run.clear();
        }
    }

    async fn start(
        &mut self,
        request: JobRequest,
        done_tx: &mpsc::UnboundedSender<(u64, DeletionSummary)>,
    ) -> StartReply {
        let query = request.query();
        info!("Received deletion request. Query: {:?}", query);

        if self.status.is_active() {
            return StartReply::Rejected(Rejection::new(RejectReason::Busy, BUSY));
        }
        if query.is_empty() {
            return StartReply::Rejected(Rejection::new(
                RejectReason::Unavailable,
                "Enter a search query first.",
            ));
        }

        if request.counts_against_quota() {
            if let Err(next) = self.quota.check(Utc::now()) {
                let local = next.with_timezone(&Local).format("%H:%M:%S");
                info!("Rate limit exceeded. Next batch at {}.", local);
                return StartReply::Rejected(Rejection {
                    reason: RejectReason::QuotaExhausted,
                    message: format!("Rate limit exceeded. Next batch at {local}."),
                    next_available_at: Some(next),
                });
            }
        }

        if let Err(e) = self.gateway.authorize().await {
            warn!("Refusing to start: {}", e);
            let reason = match e {
                GatewayError::AuthRequired(_) => RejectReason::AuthRequired,
                _ => RejectReason::Unavailable,
            };
            return StartReply::Rejected(Rejection::new(reason, e.to_string()));
        }

        self.next_job_id += 1;
        let job_id = self.next_job_id;
        let run = RunFlag::new();
        let mut engine = DeletionEngine::new(
            self.gateway.clone(),
            self.sink.clone(),
            EngineSettings {
                delete_mode: request.delete_mode,
                ..self.settings.clone()
            },
            run.clone(),
        );

        self.status = JobStatus::Running;
        self.query.clone_from(&query);
        self.current = Some(ActiveJob {
            id: job_id,
            run,
            counts_against_quota: request.counts_against_quota(),
        });

        info!("Started job {} for {:?}", job_id, query);
        self.sink.notify(ProgressEvent::JobStarted {
            job_id,
            query: query.clone(),
        });

        let done_tx = done_tx.clone();
        let job_query = query;
        tokio::spawn(async move {
            let summary = match request.kind {
                JobKind::Category { label } => engine.drain_category(&label).await,
                JobKind::Query {
                    continuous: true,
                    oldest_first,
                    ..
                } => engine.drain(&job_query, oldest_first).await,
                JobKind::Query { oldest_first, .. } => {
                    engine.delete_matching(&job_query, oldest_first).await
                }
            };
            // Only fails if the scheduler itself is gone.
            let _ = done_tx.send((job_id, summary));
        });

        StartReply::Started { job_id }
    }

    fn stop(&mut self) {
        if let Some(job) = &self.current {
            job.run.clear();
            if self.status == JobStatus::Running {
                self.status = JobStatus::Stopping;
            }
        }
        info!("Deletion has been stopped by the user.");
        self.sink.notify(ProgressEvent::JobStopped {
            message: STOPPED.to_string(),
        });
    }

    fn finish(&mut self, job_id: u64, summary: DeletionSummary) {
        let Some(job) = self.current.take_if(|job| job.id == job_id) else {
            warn!("Ignoring result of unknown job {}", job_id);
            return;
        };

        self.status = if summary.kind.is_fatal() {
            JobStatus::Failed
        } else {
            JobStatus::Stopped
        };
        if job.counts_against_quota {
            self.quota.record(summary.total_deleted, Utc::now());
        }
        self.deleted_count = summary.total_deleted;
        self.deleted_ids.clone_from(&summary.deleted_ids);
        self.last_summary = Some(summary.clone());

        info!(
            "Job {} finished ({:?}): {}",
            job_id, self.status, summary.message
        );
        self.sink.notify(ProgressEvent::JobFinished { job_id, summary });
    }

    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            status: self.status,
            query: self.query.clone(),
            deleted_count: self.deleted_count,
            deleted_ids: self.deleted_ids.clone(),
            count_in_window: self.quota.count_in_window(),
            last_deletion_at: self.quota.last_deletion_at(),
            last_summary: self.last_summary.clone(),
        }
    }
}
