//! Outbox relay: drains pending domain events to the bus.
//!
//! Outbox rows are written in the same store transaction as the state they
//! describe; this loop is the delivery half of that contract. Each cycle
//! reads a bounded batch of unprocessed rows oldest-first, publishes each
//! payload under its routing key, and marks the row processed only after the
//! publish succeeded. A failed publish is logged and left in place, so the
//! next cycle retries it.
//!
//! Delivery is therefore at-least-once: a crash between publish and mark
//! causes redelivery, and downstream consumers must be idempotent. Ordering
//! is best-effort oldest-first within a batch; nothing is promised across
//! batches interleaved with new writes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::bus::EventBus;
use crate::error::Result;
use crate::store::Store;

/// What one relay cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayCycleSummary {
    /// Rows fetched for this cycle.
    pub fetched: usize,
    /// Rows published and marked processed.
    pub published: usize,
    /// Rows whose publish failed and which remain unprocessed.
    pub failed: usize,
}

/// Background loop delivering outbox rows to the event bus.
pub struct OutboxRelay {
    store: Arc<dyn Store>,
    bus: Arc<dyn EventBus>,
    batch_size: usize,
}

impl OutboxRelay {
    /// Creates a relay draining `store` to `bus`, at most `batch_size` rows
    /// per cycle.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, bus: Arc<dyn EventBus>, batch_size: usize) -> Self {
        Self {
            store,
            bus,
            batch_size,
        }
    }

    /// Runs one relay cycle.
    ///
    /// Publish failures do not fail the cycle; they are logged, counted, and
    /// retried on a later cycle.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store itself fails.
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<RelayCycleSummary> {
        let batch = self.store.unprocessed_events(self.batch_size).await?;
        let mut summary = RelayCycleSummary {
            fetched: batch.len(),
            ..RelayCycleSummary::default()
        };
        crate::metrics::set_outbox_backlog(batch.len());

        for event in batch {
            let routing_key = event.routing_key();
            match self.bus.publish(&routing_key, &event.payload).await {
                Ok(()) => {
                    if self.store.mark_event_processed(&event.id, Utc::now()).await? {
                        summary.published += 1;
                        crate::metrics::record_outbox_published();
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    crate::metrics::record_outbox_publish_failure();
                    tracing::error!(
                        event_id = %event.id,
                        routing_key,
                        error = %e,
                        "failed to publish outbox event"
                    );
                }
            }
        }

        if summary.fetched > 0 {
            tracing::debug!(
                fetched = summary.fetched,
                published = summary.published,
                failed = summary.failed,
                "relay cycle complete"
            );
        }
        Ok(summary)
    }

    /// Runs relay cycles forever on the given interval.
    ///
    /// Store errors end a cycle but not the loop.
    pub async fn run(self, interval: Duration) {
        let mut timer = tokio::time::interval(interval);
        // The first tick completes immediately to align the interval.
        timer.tick().await;
        tracing::info!(interval_secs = interval.as_secs(), "outbox relay started");

        loop {
            timer.tick().await;
            if let Err(e) = self.run_cycle().await {
                tracing::error!(error = %e, "relay cycle failed");
            }
        }
    }
}
