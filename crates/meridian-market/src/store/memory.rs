//! In-memory store implementation for testing and development.
//!
//! This module provides [`InMemoryStore`], an implementation of the
//! [`Store`] trait backed by a single `RwLock` over all tables. Holding the
//! write lock for the duration of a call is what makes each trait method an
//! atomic transaction.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, no cross-process
//!   coordination
//! - **Single-process only**: State is not shared across process boundaries
//! - **No persistence**: All state is lost when the process exits

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use meridian_core::{AccountId, EntryId, EventId, JobId};

use super::{CasResult, EntryInsert, Store};
use crate::error::{Error, Result};
use crate::events::OutboxEvent;
use crate::job::{Job, JobStatus};
use crate::ledger::{
    AccountKind, AccountOwner, LedgerAccount, LedgerEntry, LedgerPosting, PostingSide, CURRENCY,
};

/// Internal tables protected by a single lock.
#[derive(Debug, Default)]
struct Tables {
    jobs: HashMap<JobId, Job>,
    // Append-only; insertion order is creation order.
    outbox: Vec<OutboxEvent>,
    accounts: HashMap<(AccountOwner, AccountKind, String), LedgerAccount>,
    entries: HashMap<EntryId, LedgerEntry>,
    entries_by_token: HashMap<String, EntryId>,
    postings: HashMap<EntryId, Vec<LedgerPosting>>,
    submissions: HashMap<(String, String), JobId>,
}

/// In-memory store for testing.
///
/// ## Example
///
/// ```rust
/// use meridian_market::store::memory::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// // Use store in tests...
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("store lock poisoned")
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of outbox rows, processed or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn outbox_len(&self) -> Result<usize> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables.outbox.len())
    }

    /// Returns all outbox rows for a job, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn outbox_for_job(&self, job_id: &JobId) -> Result<Vec<OutboxEvent>> {
        let aggregate_id = job_id.to_string();
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables
            .outbox
            .iter()
            .filter(|ev| ev.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }
}

fn validate_postings(postings: &[LedgerPosting]) -> Result<()> {
    let mut debits = Decimal::ZERO;
    let mut credits = Decimal::ZERO;
    for posting in postings {
        if posting.amount < Decimal::ZERO {
            return Err(Error::InvalidAmount {
                message: format!("posting amount must be non-negative, got {}", posting.amount),
            });
        }
        match posting.side {
            PostingSide::Debit => debits += posting.amount,
            PostingSide::Credit => credits += posting.amount,
        }
    }
    if debits != credits {
        return Err(Error::UnbalancedEntry { debits, credits });
    }
    Ok(())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_job(&self, job: &Job, event: OutboxEvent) -> Result<()> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        if tables.jobs.contains_key(&job.id) {
            return Err(Error::storage(format!("job already exists: {}", job.id)));
        }
        tables.jobs.insert(job.id, job.clone());
        tables.outbox.push(event);
        Ok(())
    }

    async fn update_job(&self, job: &Job, event: Option<OutboxEvent>) -> Result<()> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        if !tables.jobs.contains_key(&job.id) {
            return Err(Error::JobNotFound { job_id: job.id });
        }
        tables.jobs.insert(job.id, job.clone());
        if let Some(event) = event {
            tables.outbox.push(event);
        }
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables.jobs.get(id).cloned())
    }

    async fn cas_job_status(
        &self,
        id: &JobId,
        expected: JobStatus,
        target: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<CasResult> {
        let mut tables = self.tables.write().map_err(poison_err)?;

        let Some(job) = tables.jobs.get_mut(id) else {
            return Ok(CasResult::NotFound);
        };

        if job.status != expected {
            return Ok(CasResult::StatusMismatch { actual: job.status });
        }

        if !job.status.can_transition_to(target) {
            return Err(Error::InvalidStatusTransition {
                from: job.status,
                to: target,
            });
        }

        job.status = target;
        match target {
            JobStatus::Running => {
                if job.started_at.is_none() {
                    job.started_at = Some(now);
                }
            }
            JobStatus::Completed | JobStatus::Failed => {
                if job.ended_at.is_none() {
                    job.ended_at = Some(now);
                }
            }
            JobStatus::Submitted | JobStatus::Queued => {}
        }
        Ok(CasResult::Success)
    }

    async fn list_jobs_stuck_in(
        &self,
        status: JobStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Job>> {
        let tables = self.tables.read().map_err(poison_err)?;
        let mut stuck: Vec<Job> = tables
            .jobs
            .values()
            .filter(|job| job.status == status && job.created_at < cutoff)
            .cloned()
            .collect();
        stuck.sort_by_key(|job| job.created_at);
        Ok(stuck)
    }

    async fn unprocessed_events(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables
            .outbox
            .iter()
            .filter(|ev| !ev.is_processed())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_event_processed(&self, id: &EventId, at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        let Some(event) = tables.outbox.iter_mut().find(|ev| ev.id == *id) else {
            return Err(Error::storage(format!("outbox event not found: {id}")));
        };
        if event.processed_at.is_some() {
            return Ok(false);
        }
        event.processed_at = Some(at);
        Ok(true)
    }

    async fn find_entry_by_token(&self, token: &str) -> Result<Option<LedgerEntry>> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables
            .entries_by_token
            .get(token)
            .and_then(|id| tables.entries.get(id))
            .cloned())
    }

    async fn insert_entry(
        &self,
        entry: &LedgerEntry,
        postings: &[LedgerPosting],
    ) -> Result<EntryInsert> {
        let mut tables = self.tables.write().map_err(poison_err)?;

        if let Some(existing) = tables.entries_by_token.get(&entry.idempotency_token) {
            return Ok(EntryInsert::DuplicateToken {
                existing: *existing,
            });
        }

        validate_postings(postings)?;

        tables
            .entries_by_token
            .insert(entry.idempotency_token.clone(), entry.id);
        tables.entries.insert(entry.id, entry.clone());
        tables.postings.insert(entry.id, postings.to_vec());
        Ok(EntryInsert::Recorded)
    }

    async fn get_or_create_account(
        &self,
        owner: &AccountOwner,
        kind: AccountKind,
        name: &str,
    ) -> Result<LedgerAccount> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        let key = (*owner, kind, name.to_string());
        if let Some(account) = tables.accounts.get(&key) {
            return Ok(account.clone());
        }
        let account = LedgerAccount {
            id: AccountId::generate(),
            owner: *owner,
            kind,
            name: name.to_string(),
            currency: CURRENCY.to_string(),
        };
        tables.accounts.insert(key, account.clone());
        Ok(account)
    }

    async fn postings_for_entry(&self, id: &EntryId) -> Result<Vec<LedgerPosting>> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables.postings.get(id).cloned().unwrap_or_default())
    }

    async fn entries_for_job(&self, id: &JobId) -> Result<Vec<LedgerEntry>> {
        let tables = self.tables.read().map_err(poison_err)?;
        let mut entries: Vec<LedgerEntry> = tables
            .entries
            .values()
            .filter(|entry| entry.job_id == *id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.id);
        Ok(entries)
    }

    async fn find_submission(&self, key: &str, scope: &str) -> Result<Option<JobId>> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables
            .submissions
            .get(&(key.to_string(), scope.to_string()))
            .copied())
    }

    async fn remember_submission(&self, key: &str, scope: &str, job_id: &JobId) -> Result<()> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        tables
            .submissions
            .entry((key.to_string(), scope.to_string()))
            .or_insert(*job_id);
        Ok(())
    }
}
