//! Event bus publishers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{OutboxError, OutboxEvent, Result};

/// Trait for forwarding outbox events to an event bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event. An error leaves the event unpublished so it is
    /// retried on the next worker cycle.
    async fn publish(&self, event: &OutboxEvent) -> Result<()>;
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        (**self).publish(event).await
    }
}

/// Publisher that emits each event as a structured log record.
///
/// Used when no broker is configured.
#[derive(Debug, Clone, Default)]
pub struct LogPublisher;

impl LogPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            aggregate_type = %event.aggregate_type,
            aggregate_id = %event.aggregate_id,
            payload = %event.payload,
            "outbox event"
        );
        Ok(())
    }
}

/// Subject events are published to when none is configured.
pub const DEFAULT_NATS_SUBJECT: &str = "drone.events";

/// Publisher that sends every event, JSON-encoded, to one NATS subject.
///
/// Each publish is flushed before it reports success, so an event is only
/// marked published once the server has it.
#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
    subject: String,
}

impl NatsPublisher {
    /// Connects to the NATS server at `url`.
    pub async fn connect(url: &str, subject: impl Into<String>) -> Result<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| OutboxError::Connect(e.to_string()))?;
        tracing::info!(%url, "connected to NATS");
        Ok(Self::new(client, subject))
    }

    /// Wraps an existing client. A blank subject uses [`DEFAULT_NATS_SUBJECT`].
    pub fn new(client: async_nats::Client, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject_or_default(subject.into()),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

fn subject_or_default(subject: String) -> String {
    let trimmed = subject.trim();
    if trimmed.is_empty() {
        DEFAULT_NATS_SUBJECT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// The bytes put on the wire for one event.
fn encode(event: &OutboxEvent) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(event)?)
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        let failed = |reason: String| OutboxError::Publish {
            event_id: event.id,
            reason,
        };

        let payload = encode(event)?;
        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| failed(e.to_string()))?;
        self.client
            .flush()
            .await
            .map_err(|e| failed(e.to_string()))?;

        tracing::debug!(event_id = %event.id, subject = %self.subject, "event published to NATS");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    published: Vec<OutboxEvent>,
    fail_on_publish: bool,
    attempts: usize,
}

/// In-memory publisher for testing.
///
/// Records every successfully published event and can be switched into a
/// failing mode to simulate a bus outage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<Mutex<InMemoryPublisherState>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail (or succeed again).
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.lock().await.fail_on_publish = fail;
    }

    /// Returns the events published so far, in publish order.
    pub async fn published(&self) -> Vec<OutboxEvent> {
        self.state.lock().await.published.clone()
    }

    pub async fn published_count(&self) -> usize {
        self.state.lock().await.published.len()
    }

    /// Returns the number of publish calls, including failed ones.
    pub async fn attempts(&self) -> usize {
        self.state.lock().await.attempts
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        let mut state = self.state.lock().await;
        state.attempts += 1;

        if state.fail_on_publish {
            return Err(OutboxError::Publish {
                event_id: event.id,
                reason: "event bus unavailable".to_string(),
            });
        }

        state.published.push(event.clone());
        Ok(())
    }
}
