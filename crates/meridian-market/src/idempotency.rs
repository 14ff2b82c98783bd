//! Request-level idempotency keys.
//!
//! The submission surface accepts an optional `Idempotency-Key`; replays of
//! the same key within a scope must return the previously produced job
//! rather than resubmitting. That dedup sits in front of the orchestrator:
//! this service maps (key, scope) to the job a first submission produced,
//! and the caller answers replays from `Orchestrator::get`.

use std::sync::Arc;

use meridian_core::JobId;

use crate::error::Result;
use crate::store::Store;

/// Scope under which submission keys are remembered.
pub const JOB_SUBMIT_SCOPE: &str = "JOB_SUBMIT";

/// Maps request idempotency keys to the jobs they produced.
#[derive(Clone)]
pub struct SubmissionKeys {
    store: Arc<dyn Store>,
}

impl SubmissionKeys {
    /// Creates a key service over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Returns the job a key previously produced, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn find(&self, key: &str) -> Result<Option<JobId>> {
        self.store.find_submission(key, JOB_SUBMIT_SCOPE).await
    }

    /// Remembers that `key` produced `job_id`.
    ///
    /// A key that is already recorded keeps its first job.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn remember(&self, key: &str, job_id: JobId) -> Result<()> {
        self.store
            .remember_submission(key, JOB_SUBMIT_SCOPE, &job_id)
            .await
    }
}
