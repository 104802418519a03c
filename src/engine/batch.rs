use super::progress::ProgressEvent;
use super::{
    DeletionEngine, DeletionOutcome, OutcomeKind, NO_CONNECTIVITY, RATE_LIMITED, STOPPED_BY_USER,
};
use crate::gmail::{GatewayError, MessageRef};
use futures::future::join_all;
use tracing::{error, info, warn};

/// Chunk-level failures, least severe first. Anything else is a per-message
/// failure and only skips that message.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum ChunkFault {
    Throttled,
    AuthRequired(String),
    Unreachable,
}

impl DeletionEngine {
    /// Deletes `messages` in chunks of `batch_size`, one concurrent call per
    /// message inside a chunk and strictly one chunk after another.
    ///
    /// A chunk that hits a connectivity failure, an auth failure or a rate
    /// limit contributes nothing to the returned ids; earlier chunks do.
    pub async fn delete_batch(&mut self, messages: &[MessageRef]) -> DeletionOutcome {
        let mut deleted_ids = Vec::with_capacity(messages.len());
        if messages.is_empty() {
            return DeletionOutcome::new(
                OutcomeKind::Completed,
                "0 emails deleted successfully",
                deleted_ids,
            );
        }

        info!("Starting deletion process for {} emails...", messages.len());

        for chunk in messages.chunks(self.settings.batch_size) {
            if !self.run.is_set() {
                info!("Deletion stopped by user.");
                return DeletionOutcome::new(
                    OutcomeKind::StoppedByUser,
                    STOPPED_BY_USER,
                    deleted_ids,
                );
            }

            let results = join_all(chunk.iter().map(|msg| self.remove(&msg.id))).await;

            let mut succeeded = Vec::with_capacity(chunk.len());
            let mut fault: Option<ChunkFault> = None;
            for (msg, result) in chunk.iter().zip(results) {
                match result {
                    Ok(()) => succeeded.push(msg.id.clone()),
                    Err(GatewayError::Unreachable(_)) => {
                        fault = fault.max(Some(ChunkFault::Unreachable));
                    }
                    Err(GatewayError::AuthRequired(reason)) => {
                        fault = fault.max(Some(ChunkFault::AuthRequired(reason)));
                    }
                    Err(GatewayError::Throttled(_)) => {
                        fault = fault.max(Some(ChunkFault::Throttled));
                    }
                    Err(e) => warn!("Error deleting email ID {}: {}", msg.id, e),
                }
            }

            match fault {
                Some(ChunkFault::Unreachable) => {
                    error!("No internet connection. Stopping deletion process.");
                    self.run.clear();
                    return DeletionOutcome::new(
                        OutcomeKind::Unreachable,
                        NO_CONNECTIVITY,
                        deleted_ids,
                    );
                }
                Some(ChunkFault::AuthRequired(reason)) => {
                    error!("Credentials rejected mid-job: {}", reason);
                    self.run.clear();
                    return DeletionOutcome::new(
                        OutcomeKind::Failed,
                        format!("Error: authentication required ({reason}). Deletion stopped."),
                        deleted_ids,
                    );
                }
                Some(ChunkFault::Throttled) => {
                    warn!(
                        "Rate limit exceeded. Pausing for {}s...",
                        self.settings.throttle_cooldown.as_secs()
                    );
                    tokio::time::sleep(self.settings.throttle_cooldown).await;
                    return DeletionOutcome::new(
                        OutcomeKind::Throttled,
                        RATE_LIMITED,
                        deleted_ids,
                    );
                }
                None => {}
            }

            let count = succeeded.len();
            deleted_ids.extend(succeeded);
            self.deleted_count += count;
            info!("Deleted {} emails (Total: {})", count, self.deleted_count);
            self.sink.notify(ProgressEvent::BatchDeleted {
                count,
                total: self.deleted_count,
            });

            tokio::time::sleep(self.settings.batch_delay).await;
        }

        info!("Finished deletion process: {} emails deleted.", deleted_ids.len());
        let message = format!("{} emails deleted successfully", deleted_ids.len());
        DeletionOutcome::new(OutcomeKind::Completed, message, deleted_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{refs, FakeGateway, RecordingSink};
    use super::super::{EngineSettings, RunFlag};
    use super::*;
    use crate::gmail::DeleteMode;
    use std::sync::Arc;
    use std::time::Duration;

    fn engine(gateway: &Arc<FakeGateway>, sink: &Arc<RecordingSink>, run: RunFlag) -> DeletionEngine {
        DeletionEngine::new(gateway.clone(), sink.clone(), EngineSettings::default(), run)
    }

    fn ids(prefix: &str, range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| format!("{prefix}{i}")).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_makes_no_calls() {
        let gateway = Arc::new(FakeGateway::new());
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine(&gateway, &sink, RunFlag::new());

        let outcome = engine.delete_batch(&[]).await;

        assert_eq!(outcome.kind, OutcomeKind::Completed);
        assert!(outcome.deleted_ids.is_empty());
        assert!(gateway.deleted().is_empty());
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn forty_five_messages_make_three_chunks() {
        let gateway = Arc::new(FakeGateway::new());
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine(&gateway, &sink, RunFlag::new());

        let started = tokio::time::Instant::now();
        let outcome = engine.delete_batch(&refs("m", 45)).await;

        assert_eq!(outcome.kind, OutcomeKind::Completed);
        assert_eq!(outcome.message, "45 emails deleted successfully");
        assert_eq!(outcome.deleted_ids, ids("m", 0..45));
        assert_eq!(sink.batches(), vec![(20, 20), (20, 40), (5, 45)]);
        assert_eq!(engine.deleted_count, 45);
        // One inter-batch pause per chunk.
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_count_follows_batch_size() {
        for (len, batch_size, chunks) in [(1, 20, 1), (20, 20, 1), (21, 20, 2), (7, 3, 3), (9, 1, 9)] {
            let gateway = Arc::new(FakeGateway::new());
            let sink = Arc::new(RecordingSink::default());
            let settings = EngineSettings {
                batch_size,
                ..EngineSettings::default()
            };
            let mut engine = DeletionEngine::new(gateway.clone(), sink.clone(), settings, RunFlag::new());

            let outcome = engine.delete_batch(&refs("m", len)).await;
            assert_eq!(sink.batches().len(), chunks, "len={len} batch_size={batch_size}");
            assert_eq!(outcome.deleted_ids.len(), len);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_takes_effect_at_the_next_chunk_boundary() {
        let run = RunFlag::new();
        let trigger = run.clone();
        // The stop arrives while chunk 2 is in flight.
        let gateway = Arc::new(FakeGateway::new().on_delete(move |id| {
            if id == "m25" {
                trigger.clear();
            }
        }));
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine(&gateway, &sink, run.clone());

        let outcome = engine.delete_batch(&refs("m", 60)).await;

        assert_eq!(outcome.kind, OutcomeKind::StoppedByUser);
        assert_eq!(outcome.message, STOPPED_BY_USER);
        assert_eq!(outcome.deleted_ids, ids("m", 0..40));
        assert_eq!(gateway.deleted().len(), 40);
        assert!(!run.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn already_stopped_deletes_nothing() {
        let run = RunFlag::new();
        run.clear();
        let gateway = Arc::new(FakeGateway::new());
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine(&gateway, &sink, run);

        let outcome = engine.delete_batch(&refs("m", 5)).await;
        assert_eq!(outcome.kind, OutcomeKind::StoppedByUser);
        assert!(outcome.deleted_ids.is_empty());
        assert!(gateway.deleted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_on_second_chunk_pauses_and_keeps_running() {
        let gateway = Arc::new(
            FakeGateway::new().failing("m30", GatewayError::Throttled("429".to_string())),
        );
        let sink = Arc::new(RecordingSink::default());
        let run = RunFlag::new();
        let mut engine = engine(&gateway, &sink, run.clone());

        let started = tokio::time::Instant::now();
        let outcome = engine.delete_batch(&refs("m", 45)).await;

        assert_eq!(outcome.kind, OutcomeKind::Throttled);
        assert_eq!(outcome.message, RATE_LIMITED);
        assert_eq!(outcome.deleted_ids, ids("m", 0..20));
        // Chunk 2 ran apart from the throttled id; chunk 3 was never attempted.
        let attempted = gateway.deleted();
        assert_eq!(attempted.len(), 39);
        assert!(ids("m", 40..45).iter().all(|id| !attempted.contains(id)));
        assert_eq!(sink.batches(), vec![(20, 20)]);
        assert!(run.is_set());
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_clears_the_flag() {
        let gateway = Arc::new(
            FakeGateway::new().failing("m41", GatewayError::Unreachable("dns".to_string())),
        );
        let sink = Arc::new(RecordingSink::default());
        let run = RunFlag::new();
        let mut engine = engine(&gateway, &sink, run.clone());

        let outcome = engine.delete_batch(&refs("m", 45)).await;

        assert_eq!(outcome.kind, OutcomeKind::Unreachable);
        assert_eq!(outcome.message, NO_CONNECTIVITY);
        assert_eq!(outcome.deleted_ids, ids("m", 0..40));
        assert!(!run.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_credentials_fail_the_batch() {
        let gateway = Arc::new(
            FakeGateway::new().failing("m3", GatewayError::AuthRequired("revoked".to_string())),
        );
        let sink = Arc::new(RecordingSink::default());
        let run = RunFlag::new();
        let mut engine = engine(&gateway, &sink, run.clone());

        let outcome = engine.delete_batch(&refs("m", 10)).await;

        assert_eq!(outcome.kind, OutcomeKind::Failed);
        assert!(outcome.message.contains("revoked"));
        assert!(outcome.deleted_ids.is_empty());
        assert!(!run.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn single_bad_id_is_skipped() {
        let gateway = Arc::new(
            FakeGateway::new().failing("m7", GatewayError::Unknown("404".to_string())),
        );
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine(&gateway, &sink, RunFlag::new());

        let outcome = engine.delete_batch(&refs("m", 25)).await;

        assert_eq!(outcome.kind, OutcomeKind::Completed);
        assert_eq!(outcome.deleted_ids.len(), 24);
        assert!(!outcome.deleted_ids.contains(&"m7".to_string()));
        assert_eq!(sink.batches(), vec![(19, 19), (5, 24)]);
    }

    #[tokio::test(start_paused = true)]
    async fn trash_mode_uses_trash_endpoint() {
        let gateway = Arc::new(FakeGateway::new());
        let sink = Arc::new(RecordingSink::default());
        let settings = EngineSettings {
            delete_mode: DeleteMode::Trash,
            ..EngineSettings::default()
        };
        let mut engine = DeletionEngine::new(gateway.clone(), sink, settings, RunFlag::new());

        engine.delete_batch(&refs("m", 3)).await;

        assert!(gateway.deleted().is_empty());
        assert_eq!(*gateway.trashed.lock().unwrap(), ids("m", 0..3));
    }
}
