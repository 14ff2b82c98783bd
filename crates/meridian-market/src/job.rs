//! The job entity and its status state machine.
//!
//! A job is one submitted unit of work. Its status only moves forward:
//! `Submitted -> Queued -> Running -> {Completed | Failed}`, with `Failed`
//! also reachable from `Queued` when provisioning never starts. The provider
//! label is recorded at most once, when the job first becomes `Running`.
//! Jobs are never deleted; the created/started/ended timestamps carry the
//! history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use meridian_core::{JobId, UserId};

use crate::error::{Error, Result};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Accepted by the control plane, not yet persisted as workable.
    Submitted,
    /// Persisted and awaiting a provisioning outcome.
    Queued,
    /// A provider instance was provisioned and started.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully (configuration or provider failure).
    Failed,
}

impl JobStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the transition from self to target is valid.
    ///
    /// Transitions are monotonic forward; there is no path back.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Submitted => matches!(target, Self::Queued),
            Self::Queued => matches!(target, Self::Running | Self::Failed),
            Self::Running => matches!(target, Self::Completed | Self::Failed),
            Self::Completed | Self::Failed => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Submitted => "SUBMITTED",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        write!(f, "{name}")
    }
}

/// One submitted unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// The user who submitted the job.
    pub user_id: UserId,
    /// Provider label, recorded when the job first becomes `Running`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Opaque agent specification payload; the control plane does not
    /// interpret it.
    pub agent_spec: serde_json::Value,
    /// Opaque resource-hint payload. The `region` and `resourceType` keys,
    /// when present, steer quoting.
    pub resource_hint: serde_json::Value,
    /// Maximum budget the submitter is willing to spend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_budget: Option<Decimal>,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
    /// When the job first reached `Running`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a fresh job in `Submitted` status.
    #[must_use]
    pub fn new(
        user_id: UserId,
        agent_spec: serde_json::Value,
        resource_hint: serde_json::Value,
        max_budget: Option<Decimal>,
    ) -> Self {
        Self {
            id: JobId::generate(),
            user_id,
            provider: None,
            status: JobStatus::Submitted,
            agent_spec,
            resource_hint,
            max_budget,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Moves the job to `target`, validating the transition.
    ///
    /// Timestamps follow the status: the first transition to `Running` sets
    /// `started_at`, a terminal transition sets `ended_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStatusTransition`] when the state machine does
    /// not allow the move.
    pub fn transition_to(&mut self, target: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(Error::InvalidStatusTransition {
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        let now = Utc::now();
        match target {
            JobStatus::Running => {
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
            }
            JobStatus::Completed | JobStatus::Failed => {
                if self.ended_at.is_none() {
                    self.ended_at = Some(now);
                }
            }
            JobStatus::Submitted | JobStatus::Queued => {}
        }
        Ok(())
    }

    /// Records the provider label chosen for this job.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a different provider was already recorded;
    /// the label is written at most once.
    pub fn assign_provider(&mut self, provider: impl Into<String>) -> Result<()> {
        let provider = provider.into();
        match &self.provider {
            None => {
                self.provider = Some(provider);
                Ok(())
            }
            Some(existing) if *existing == provider => Ok(()),
            Some(existing) => Err(Error::storage(format!(
                "provider already assigned: {existing}"
            ))),
        }
    }

    /// Region the job should be quoted in, if the resource hint names one.
    #[must_use]
    pub fn hinted_region(&self) -> Option<&str> {
        self.resource_hint.get("region").and_then(|v| v.as_str())
    }

    /// Resource type the job should be quoted for, if the hint names one.
    #[must_use]
    pub fn hinted_resource_type(&self) -> Option<&str> {
        self.resource_hint
            .get("resourceType")
            .and_then(|v| v.as_str())
    }
}
