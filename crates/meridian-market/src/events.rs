//! Domain events and the outbox row that carries them.
//!
//! Every milestone in a job's life is described by a [`DomainEvent`] and
//! persisted as an [`OutboxEvent`] row in the same transaction as the state
//! change it describes. The relay later drains unprocessed rows to the bus,
//! so an event can never be lost if its state change committed, nor exist if
//! it didn't.
//!
//! ## Why ULID for event IDs
//!
//! Event IDs are ULIDs: globally unique without coordination, and roughly
//! creation-ordered when compared as strings. The authoritative ordering key
//! for the relay is `created_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meridian_core::{EventId, JobId, UserId};

use crate::error::{Error, Result};
use crate::job::Job;

/// Exchange the relay publishes to.
pub const EVENTS_EXCHANGE: &str = "compute.events";

/// Routing-key prefix for job events.
pub const JOB_ROUTING_PREFIX: &str = "job";

/// A domain fact about one job, in payload form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum DomainEvent {
    /// A job was accepted and persisted as workable.
    #[serde(rename_all = "camelCase")]
    JobSubmitted {
        /// The job that was submitted.
        job_id: JobId,
        /// The submitting user.
        user_id: UserId,
    },
    /// A provider instance was provisioned and started for a job.
    #[serde(rename_all = "camelCase")]
    JobStarted {
        /// The job that started.
        job_id: JobId,
        /// The owning user.
        user_id: UserId,
        /// The provider that runs the job.
        provider: String,
    },
    /// A job reached a terminal outcome.
    #[serde(rename_all = "camelCase")]
    JobCompleted {
        /// The job that finished.
        job_id: JobId,
        /// The owning user.
        user_id: UserId,
        /// Whether the job succeeded.
        success: bool,
    },
    /// A usage report was collected from the provider.
    #[serde(rename_all = "camelCase")]
    UsageReported {
        /// The job the usage belongs to.
        job_id: JobId,
        /// The provider that reported it.
        provider: String,
        /// The provider's cost estimate.
        cost_estimate: f64,
    },
}

impl DomainEvent {
    /// The event's type name, as used in outbox rows and routing keys.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::JobSubmitted { .. } => "JobSubmitted",
            Self::JobStarted { .. } => "JobStarted",
            Self::JobCompleted { .. } => "JobCompleted",
            Self::UsageReported { .. } => "UsageReported",
        }
    }

    /// The job this event describes.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        match self {
            Self::JobSubmitted { job_id, .. }
            | Self::JobStarted { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::UsageReported { job_id, .. } => *job_id,
        }
    }
}

/// One domain fact pending delivery to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEvent {
    /// Unique event identifier; creation-ordered.
    pub id: EventId,
    /// Event type name (e.g. `JobStarted`).
    pub event_type: String,
    /// Aggregate type the event describes.
    pub aggregate_type: String,
    /// Identity of the aggregate instance.
    pub aggregate_id: String,
    /// Correlation identity, typically the job ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
    /// When the relay delivered the row; `None` until then. Transitions
    /// null to non-null exactly once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Builds an outbox row for a job event.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload cannot be encoded.
    pub fn for_job(job: &Job, event: &DomainEvent) -> Result<Self> {
        let payload = serde_json::to_value(event).map_err(|e| Error::Serialization {
            message: format!("failed to serialize {} payload: {e}", event.event_type()),
        })?;

        Ok(Self {
            id: EventId::generate(),
            event_type: event.event_type().to_string(),
            aggregate_type: "Job".to_string(),
            aggregate_id: job.id.to_string(),
            correlation_id: Some(job.id.to_string()),
            payload,
            created_at: Utc::now(),
            processed_at: None,
        })
    }

    /// The routing key this row publishes under: `job.<type lowercased>`.
    #[must_use]
    pub fn routing_key(&self) -> String {
        format!("{JOB_ROUTING_PREFIX}.{}", self.event_type.to_lowercase())
    }

    /// Returns true if the relay already delivered this row.
    #[must_use]
    pub const fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}
