//! In-memory event bus for testing.
//!
//! Records every published message and can be scripted to fail, which is how
//! relay tests exercise the leave-for-next-cycle path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::EventBus;
use crate::error::{Error, Result};

/// One message the bus accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    /// The routing key the message was published under.
    pub routing_key: String,
    /// The message payload.
    pub payload: serde_json::Value,
}

/// In-memory event bus.
///
/// ## Example
///
/// ```rust
/// use meridian_market::bus::memory::InMemoryBus;
///
/// let bus = InMemoryBus::new();
/// // Publish from a relay under test, then inspect `bus.published()`.
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBus {
    published: RwLock<Vec<PublishedMessage>>,
    failures_remaining: AtomicUsize,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("bus lock poisoned")
}

impl InMemoryBus {
    /// Creates a bus that accepts every publish.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` publish attempts fail.
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Returns all accepted messages in publish order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn published(&self) -> Result<Vec<PublishedMessage>> {
        let published = self.published.read().map_err(poison_err)?;
        Ok(published.clone())
    }

    /// Returns the routing keys of all accepted messages, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn routing_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .published()?
            .into_iter()
            .map(|m| m.routing_key)
            .collect())
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, routing_key: &str, payload: &serde_json::Value) -> Result<()> {
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Error::Publish {
                routing_key: routing_key.to_string(),
                message: "injected failure".to_string(),
            });
        }

        let mut published = self.published.write().map_err(poison_err)?;
        published.push(PublishedMessage {
            routing_key: routing_key.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}
