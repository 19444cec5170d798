use thiserror::Error;

use crate::EventId;

/// Errors that can occur while draining the outbox.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The event bus rejected or could not accept an event.
    #[error("Publish failed for event {event_id}: {reason}")]
    Publish { event_id: EventId, reason: String },

    /// The event bus could not be reached.
    #[error("Event bus connection failed: {0}")]
    Connect(String),

    /// The backing store failed to fetch or mark events.
    #[error("Outbox repository error: {0}")]
    Repository(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Events reached the bus but could not be marked as published. They
    /// stay pending and are delivered again.
    #[error("Marking {published} published events failed: {source}")]
    MarkPublished {
        published: usize,
        #[source]
        source: Box<OutboxError>,
    },

    /// A stored value could not be interpreted.
    #[error("Invalid outbox record: {0}")]
    InvalidRecord(String),

    /// A payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OutboxError {
    /// Wraps a store error.
    pub fn repository<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        OutboxError::Repository(Box::new(err))
    }
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
