//! Background worker that drains the outbox.

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::{EventPublisher, OutboxError, OutboxRepository, Result};

/// Default time between two drain cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default maximum number of events fetched per cycle.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Configuration for the outbox worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboxWorkerConfig {
    /// How often to poll for unpublished events.
    pub poll_interval: Duration,

    /// Maximum number of events handled per cycle.
    pub batch_size: usize,
}

impl OutboxWorkerConfig {
    pub fn new(poll_interval: Duration, batch_size: usize) -> Self {
        Self {
            poll_interval,
            batch_size,
        }
        .normalized()
    }

    /// Replaces zero values with the defaults.
    pub fn normalized(self) -> Self {
        Self {
            poll_interval: if self.poll_interval.is_zero() {
                DEFAULT_POLL_INTERVAL
            } else {
                self.poll_interval
            },
            batch_size: if self.batch_size == 0 {
                DEFAULT_BATCH_SIZE
            } else {
                self.batch_size
            },
        }
    }
}

impl Default for OutboxWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Outcome of a single drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Events fetched from the outbox.
    pub fetched: usize,

    /// Events published and marked as published.
    pub published: usize,

    /// Events whose publish attempt failed; they stay pending.
    pub failed: usize,
}

/// Polls the outbox and forwards pending events to the event bus.
///
/// Each cycle fetches a batch of unpublished events, publishes them one by
/// one, and marks exactly the successful ones as published in a single
/// batched update. Failed publishes and fetch errors are logged and retried
/// on the next tick. Only cancellation stops the loop, and it is observed
/// between cycles so a batch is never abandoned halfway through.
pub struct OutboxWorker<R, P> {
    repository: R,
    publisher: P,
    config: OutboxWorkerConfig,
}

impl<R, P> OutboxWorker<R, P>
where
    R: OutboxRepository + 'static,
    P: EventPublisher + 'static,
{
    /// Creates a new worker.
    pub fn new(repository: R, publisher: P, config: OutboxWorkerConfig) -> Self {
        Self {
            repository,
            publisher,
            config: config.normalized(),
        }
    }

    /// Spawns the poll loop on the current runtime.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    /// Runs the poll loop until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "outbox worker started"
        );

        let mut tick = interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown signal received, stopping outbox worker");
                    break;
                }
                _ = tick.tick() => {
                    match self.run_cycle().await {
                        Ok(report) if report.fetched > 0 => {
                            tracing::debug!(
                                fetched = report.fetched,
                                published = report.published,
                                failed = report.failed,
                                "outbox cycle completed"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            metrics::counter!(failure_counter(&e)).increment(1);
                            tracing::warn!(error = %e, "outbox cycle failed");
                        }
                    }
                }
            }
        }

        tracing::info!("outbox worker stopped");
    }

    /// Executes one fetch → publish → mark cycle.
    ///
    /// Returns an error only when fetching or marking fails; individual
    /// publish failures are counted in the report.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started = Instant::now();
        let events = self
            .repository
            .fetch_pending(self.config.batch_size)
            .await?;

        let mut report = CycleReport {
            fetched: events.len(),
            ..CycleReport::default()
        };
        if events.is_empty() {
            return Ok(report);
        }

        let mut published = Vec::with_capacity(events.len());
        for event in &events {
            match self.publisher.publish(event).await {
                Ok(()) => published.push(event.id),
                Err(e) => {
                    report.failed += 1;
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    tracing::warn!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        error = %e,
                        "outbox publish failed"
                    );
                }
            }
        }

        report.published = published.len();
        metrics::counter!("outbox_events_published_total").increment(report.published as u64);

        if !published.is_empty() {
            // Published but unmarked events are redelivered next cycle.
            self.repository
                .mark_published(&published)
                .await
                .map_err(|e| OutboxError::MarkPublished {
                    published: report.published,
                    source: Box::new(e),
                })?;
        }

        metrics::histogram!("outbox_cycle_duration_seconds").record(started.elapsed().as_secs_f64());

        Ok(report)
    }
}

/// Counter a failed cycle is recorded under.
fn failure_counter(err: &OutboxError) -> &'static str {
    match err {
        OutboxError::MarkPublished { .. } => "outbox_mark_failures_total",
        _ => "outbox_fetch_errors_total",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = OutboxWorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let config = OutboxWorkerConfig::new(Duration::ZERO, 0);
        assert_eq!(config, OutboxWorkerConfig::default());
    }

    #[test]
    fn mark_failures_are_counted_apart_from_fetch_errors() {
        let fetch = OutboxError::repository(std::io::Error::other("down"));
        assert_eq!(failure_counter(&fetch), "outbox_fetch_errors_total");

        let mark = OutboxError::MarkPublished {
            published: 2,
            source: Box::new(OutboxError::repository(std::io::Error::other("down"))),
        };
        assert_eq!(failure_counter(&mark), "outbox_mark_failures_total");
    }

    #[test]
    fn explicit_values_are_kept() {
        let config = OutboxWorkerConfig::new(Duration::from_millis(250), 10);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.batch_size, 10);
    }
}
