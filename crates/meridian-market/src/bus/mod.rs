//! Event-bus abstraction for durable domain-event delivery.
//!
//! The relay publishes outbox payloads through [`EventBus`]. Implementations
//! may target an AMQP topic exchange, a cloud pub/sub topic, or the
//! in-memory bus for testing; the control plane only assumes a durable
//! `publish(routing_key, payload)` that succeeds or fails as a whole.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

/// Durable publish channel for domain events.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync`; the relay shares the bus with nothing
/// else, but implementations must tolerate concurrent use.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes `payload` under `routing_key`.
    ///
    /// # Errors
    ///
    /// Returns a publish error when the message could not be handed to the
    /// durable channel; the caller decides whether to retry later.
    async fn publish(&self, routing_key: &str, payload: &serde_json::Value) -> Result<()>;
}
