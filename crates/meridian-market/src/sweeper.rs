//! Reconciliation sweeper: repairs jobs stuck in QUEUED.
//!
//! A job that never received a provisioning outcome (for instance because
//! the process died mid-submission) would otherwise sit QUEUED forever. Each
//! sweeper cycle finds QUEUED jobs older than the staleness window and
//! advances them to RUNNING with `started_at = now`.
//!
//! This is a liveness repair, not a correctness proof: nothing confirms a
//! provider actually started anything, so a crashed-mid-submission job can
//! surface as falsely RUNNING. The behavior is kept for compatibility with
//! the reference deployment; treat repaired jobs as candidates for deeper
//! reconciliation, not as verified work.
//!
//! Each repair is its own compare-and-swap, so a submission that advances
//! the same job concurrently wins and the sweeper skips it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::Result;
use crate::job::JobStatus;
use crate::store::{CasResult, Store};

/// What one sweeper cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepSummary {
    /// Stale jobs found by the scan.
    pub scanned: usize,
    /// Jobs advanced to RUNNING.
    pub repaired: usize,
    /// Jobs skipped because their status changed under the sweeper.
    pub skipped: usize,
}

/// Background loop repairing stale QUEUED jobs.
pub struct ReconciliationSweeper {
    store: Arc<dyn Store>,
    stale_after: chrono::Duration,
}

impl ReconciliationSweeper {
    /// Creates a sweeper over `store` with the given staleness window.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, stale_after: chrono::Duration) -> Self {
        Self { store, stale_after }
    }

    /// Runs one sweep cycle.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store fails; individual repairs that
    /// lose their compare-and-swap are counted as skipped.
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<SweepSummary> {
        let now = Utc::now();
        let cutoff = now - self.stale_after;
        let stuck = self.store.list_jobs_stuck_in(JobStatus::Queued, cutoff).await?;

        let mut summary = SweepSummary {
            scanned: stuck.len(),
            ..SweepSummary::default()
        };

        for job in stuck {
            let result = self
                .store
                .cas_job_status(&job.id, JobStatus::Queued, JobStatus::Running, Utc::now())
                .await?;
            match result {
                CasResult::Success => {
                    summary.repaired += 1;
                    crate::metrics::record_sweeper_repair();
                    tracing::warn!(
                        job_id = %job.id,
                        queued_for_secs = (now - job.created_at).num_seconds(),
                        "repaired stale job to RUNNING without provider confirmation"
                    );
                }
                CasResult::StatusMismatch { actual } => {
                    summary.skipped += 1;
                    tracing::debug!(job_id = %job.id, %actual, "stale job moved on its own, skipping");
                }
                CasResult::NotFound => {
                    summary.skipped += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Runs sweep cycles forever on the given interval.
    ///
    /// Store errors end a cycle but not the loop.
    pub async fn run(self, interval: Duration) {
        let mut timer = tokio::time::interval(interval);
        // The first tick completes immediately to align the interval.
        timer.tick().await;
        tracing::info!(interval_secs = interval.as_secs(), "reconciliation sweeper started");

        loop {
            timer.tick().await;
            if let Err(e) = self.run_cycle().await {
                tracing::error!(error = %e, "sweep cycle failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DomainEvent, OutboxEvent};
    use crate::job::Job;
    use crate::store::memory::InMemoryStore;
    use meridian_core::UserId;
    use serde_json::json;

    async fn seed_queued_job(store: &InMemoryStore, age: chrono::Duration) -> Result<Job> {
        let mut job = Job::new(UserId::generate(), json!({}), json!({}), None);
        job.transition_to(JobStatus::Queued).unwrap();
        job.created_at = Utc::now() - age;
        let event = OutboxEvent::for_job(
            &job,
            &DomainEvent::JobSubmitted {
                job_id: job.id,
                user_id: job.user_id,
            },
        )?;
        store.insert_job(&job, event).await?;
        Ok(job)
    }

    #[tokio::test]
    async fn stale_queued_job_is_repaired() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let job = seed_queued_job(&store, chrono::Duration::minutes(10)).await?;

        let sweeper = ReconciliationSweeper::new(store.clone(), chrono::Duration::minutes(5));
        let summary = sweeper.run_cycle().await?;

        assert_eq!(summary.repaired, 1);
        let repaired = store.get_job(&job.id).await?.unwrap();
        assert_eq!(repaired.status, JobStatus::Running);
        assert!(repaired.started_at.is_some());
        // No provider was involved; the status is a repair, nothing more.
        assert!(repaired.provider.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn fresh_queued_job_is_left_alone() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let job = seed_queued_job(&store, chrono::Duration::minutes(1)).await?;

        let sweeper = ReconciliationSweeper::new(store.clone(), chrono::Duration::minutes(5));
        let summary = sweeper.run_cycle().await?;

        assert_eq!(summary.scanned, 0);
        assert_eq!(summary.repaired, 0);
        let untouched = store.get_job(&job.id).await?.unwrap();
        assert_eq!(untouched.status, JobStatus::Queued);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_transition_wins_over_sweeper() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let job = seed_queued_job(&store, chrono::Duration::minutes(10)).await?;

        // The submission path fails the job between the scan and the repair.
        let mut failed = store.get_job(&job.id).await?.unwrap();
        failed.transition_to(JobStatus::Failed).unwrap();
        store.update_job(&failed, None).await?;

        let sweeper = ReconciliationSweeper::new(store.clone(), chrono::Duration::minutes(5));
        let summary = sweeper.run_cycle().await?;

        assert_eq!(summary.repaired, 0);
        let job = store.get_job(&job.id).await?.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        Ok(())
    }

    #[tokio::test]
    async fn repair_is_idempotent_across_cycles() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        seed_queued_job(&store, chrono::Duration::minutes(10)).await?;

        let sweeper = ReconciliationSweeper::new(store.clone(), chrono::Duration::minutes(5));
        assert_eq!(sweeper.run_cycle().await?.repaired, 1);
        assert_eq!(sweeper.run_cycle().await?.repaired, 0);
        Ok(())
    }
}
