use super::{DeletionEngine, DeletionSummary, OutcomeKind, NO_CONNECTIVITY, STOPPED_BY_USER};
use crate::gmail::{GatewayError, MessageRef};
use tracing::{error, info, warn};

pub fn category_query(label: &str) -> String {
    format!("category:{}", label.trim().to_lowercase())
}

#[derive(Debug, Default)]
struct Tally {
    pages: usize,
    deleted_ids: Vec<String>,
}

impl Tally {
    fn finish(self, kind: OutcomeKind, message: impl Into<String>) -> DeletionSummary {
        DeletionSummary {
            kind,
            message: message.into(),
            total_deleted: self.deleted_ids.len(),
            pages: self.pages,
            deleted_ids: self.deleted_ids,
        }
    }
}

enum Listing {
    Page(Vec<MessageRef>),
    Retry,
    Halt(OutcomeKind, String),
}

impl DeletionEngine {
    /// Repeatedly lists `query` and deletes the returned page until nothing
    /// matches or the job stops. The query is re-listed after every page
    /// because deletions shift the provider's result set.
    ///
    /// `oldest_first` only reverses each fetched page; there is no global
    /// ordering across pages.
    pub async fn drain(&mut self, query: &str, oldest_first: bool) -> DeletionSummary {
        let mut tally = Tally::default();

        loop {
            if !self.run.is_set() {
                info!("Drain of {:?} stopped by user.", query);
                return tally.finish(OutcomeKind::StoppedByUser, STOPPED_BY_USER);
            }

            info!("Fetching more emails for {:?}...", query);
            let mut page = match self.list_page(query).await {
                Listing::Page(page) => page,
                Listing::Retry => continue,
                Listing::Halt(kind, message) => return tally.finish(kind, message),
            };

            if page.is_empty() {
                info!("No more emails match {:?}.", query);
                let message = format!("Finished: {} emails deleted", tally.deleted_ids.len());
                return tally.finish(OutcomeKind::Completed, message);
            }
            if oldest_first {
                page.reverse();
            }

            info!("Found {} emails. Deleting...", page.len());
            tally.pages += 1;
            let outcome = self.delete_batch(&page).await;
            let progressed = !outcome.deleted_ids.is_empty();
            tally.deleted_ids.extend(outcome.deleted_ids);

            match outcome.kind {
                OutcomeKind::StoppedByUser | OutcomeKind::Unreachable | OutcomeKind::Failed => {
                    return tally.finish(outcome.kind, outcome.message);
                }
                OutcomeKind::Throttled => {}
                OutcomeKind::Completed if !progressed => {
                    // Re-listing would return the same undeletable page forever.
                    error!("No email on the page could be deleted. Stopping.");
                    self.run.clear();
                    return tally.finish(
                        OutcomeKind::Failed,
                        "Error: none of the listed emails could be deleted. Deletion stopped.",
                    );
                }
                OutcomeKind::Completed => {}
            }
        }
    }

    pub async fn drain_category(&mut self, label: &str) -> DeletionSummary {
        self.drain(&category_query(label), false).await
    }

    /// Lists a single page and deletes it.
    pub async fn delete_matching(&mut self, query: &str, oldest_first: bool) -> DeletionSummary {
        let mut tally = Tally::default();

        let mut page = loop {
            match self.list_page(query).await {
                Listing::Page(page) => break page,
                Listing::Retry => {
                    if !self.run.is_set() {
                        return tally.finish(OutcomeKind::StoppedByUser, STOPPED_BY_USER);
                    }
                }
                Listing::Halt(kind, message) => return tally.finish(kind, message),
            }
        };

        if page.is_empty() {
            info!("No emails found matching query: {:?}.", query);
            return tally.finish(OutcomeKind::Completed, "No emails found matching the query.");
        }
        if oldest_first {
            page.reverse();
        }

        info!("Found {} emails matching query. Proceeding with deletion...", page.len());
        tally.pages = 1;
        let outcome = self.delete_batch(&page).await;
        tally.deleted_ids = outcome.deleted_ids;
        tally.finish(outcome.kind, outcome.message)
    }

    async fn list_page(&self, query: &str) -> Listing {
        match self.gateway.list(query).await {
            Ok(page) => Listing::Page(page),
            Err(GatewayError::Throttled(reason)) => {
                warn!(
                    "Listing throttled ({}). Pausing for {}s...",
                    reason,
                    self.settings.throttle_cooldown.as_secs()
                );
                tokio::time::sleep(self.settings.throttle_cooldown).await;
                Listing::Retry
            }
            Err(GatewayError::Unreachable(reason)) => {
                error!("No internet connection detected ({}). Stopping process.", reason);
                self.run.clear();
                Listing::Halt(OutcomeKind::Unreachable, NO_CONNECTIVITY.to_string())
            }
            Err(e) => {
                error!("Error fetching emails for {:?}: {}", query, e);
                self.run.clear();
                Listing::Halt(OutcomeKind::Failed, format!("Error fetching emails: {e}"))
            }
        }
    }
}
