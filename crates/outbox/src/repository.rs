use async_trait::async_trait;

use crate::{EventId, OutboxEvent, Result};

/// Store-side operations the outbox worker needs.
///
/// Both calls run outside any business transaction. Implementations must
/// only ever return events whose writing transaction has committed.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Fetches up to `limit` unpublished events, oldest `occurred_at` first.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>>;

    /// Stamps the publication time on exactly the given events.
    ///
    /// An empty slice is a no-op. Already-published IDs are left unchanged.
    async fn mark_published(&self, ids: &[EventId]) -> Result<()>;
}
