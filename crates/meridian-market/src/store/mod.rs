//! Pluggable storage for control-plane state.
//!
//! The [`Store`] trait defines the persistence layer for jobs, outbox rows,
//! ledger records, and request idempotency keys. Every method is one logical
//! transaction: implementations must apply each call atomically (all rows or
//! none) and enforce the uniqueness constraints the control plane relies on.
//!
//! ## Design Principles
//!
//! - **Semantic operations**: The trait exposes one method per logical
//!   mutation ("insert job with its outbox row") instead of a generic
//!   transaction API, so the atomic scopes are fixed by the interface.
//! - **CAS semantics**: Status repairs use compare-and-swap to avoid lost
//!   updates between the sweeper and the submission path.
//! - **Testability**: In-memory implementation for testing; a relational
//!   backend carries the same contract in production.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use meridian_core::{EntryId, EventId, JobId};

use crate::error::Result;
use crate::events::OutboxEvent;
use crate::job::{Job, JobStatus};
use crate::ledger::{AccountKind, AccountOwner, LedgerAccount, LedgerEntry, LedgerPosting};

/// Result of a compare-and-swap on a job's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// The transition was applied.
    Success,
    /// The job does not exist.
    NotFound,
    /// The job's status didn't match the expected value.
    StatusMismatch {
        /// The actual status that was found.
        actual: JobStatus,
    },
}

impl CasResult {
    /// Returns true if the operation succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Outcome of inserting a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryInsert {
    /// The entry and its postings were recorded.
    Recorded,
    /// An entry with the same idempotency token already exists; nothing was
    /// written.
    DuplicateToken {
        /// The existing entry's ID.
        existing: EntryId,
    },
}

impl EntryInsert {
    /// Returns true if the entry was newly recorded.
    #[must_use]
    pub const fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded)
    }
}

/// Storage abstraction for control-plane state.
///
/// ## Atomicity
///
/// Each method is a transaction. In particular:
/// - `insert_job` / `update_job` persist the job row and its outbox row
///   together, or not at all.
/// - `insert_entry` writes the entry and all its postings together, after
///   checking the idempotency-token uniqueness constraint.
/// - `get_or_create_account` must not produce two accounts for the same
///   (owner, kind, name) under concurrent first use.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` to support concurrent access from the
/// submission path and the background loops.
#[async_trait]
pub trait Store: Send + Sync {
    // --- Job operations ---

    /// Inserts a new job together with an outbox row.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a job with the same ID already exists.
    async fn insert_job(&self, job: &Job, event: OutboxEvent) -> Result<()>;

    /// Updates an existing job, optionally appending an outbox row in the
    /// same transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::JobNotFound`] if the job does not
    /// exist.
    async fn update_job(&self, job: &Job, event: Option<OutboxEvent>) -> Result<()>;

    /// Gets a job by ID.
    ///
    /// Returns `None` if the job does not exist.
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>>;

    /// Atomically moves a job's status if the current status matches
    /// `expected`.
    ///
    /// A transition to [`JobStatus::Running`] sets `started_at = now` when
    /// unset; a terminal transition sets `ended_at` the same way.
    async fn cas_job_status(
        &self,
        id: &JobId,
        expected: JobStatus,
        target: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<CasResult>;

    /// Lists jobs sitting in `status` whose creation time is before
    /// `cutoff`.
    async fn list_jobs_stuck_in(
        &self,
        status: JobStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Job>>;

    // --- Outbox operations ---

    /// Returns up to `limit` unprocessed outbox rows, oldest first.
    async fn unprocessed_events(&self, limit: usize) -> Result<Vec<OutboxEvent>>;

    /// Marks an outbox row processed at `at`.
    ///
    /// Returns true if the row was newly marked; false if it was already
    /// processed. `processed_at` is written at most once.
    async fn mark_event_processed(&self, id: &EventId, at: DateTime<Utc>) -> Result<bool>;

    // --- Ledger operations ---

    /// Finds a ledger entry by its idempotency token.
    async fn find_entry_by_token(&self, token: &str) -> Result<Option<LedgerEntry>>;

    /// Inserts a ledger entry with its postings, atomically.
    ///
    /// The idempotency-token uniqueness constraint is checked inside the
    /// same transaction; a duplicate token writes nothing and reports the
    /// existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::UnbalancedEntry`] if the postings'
    /// debit and credit sums differ, and [`crate::error::Error::InvalidAmount`]
    /// if any posting amount is negative.
    async fn insert_entry(
        &self,
        entry: &LedgerEntry,
        postings: &[LedgerPosting],
    ) -> Result<EntryInsert>;

    /// Resolves the account for (owner, kind, name), creating it on first
    /// use.
    async fn get_or_create_account(
        &self,
        owner: &AccountOwner,
        kind: AccountKind,
        name: &str,
    ) -> Result<LedgerAccount>;

    /// Returns the postings recorded for an entry.
    async fn postings_for_entry(&self, id: &EntryId) -> Result<Vec<LedgerPosting>>;

    /// Returns the entries recorded against a job, oldest first.
    async fn entries_for_job(&self, id: &JobId) -> Result<Vec<LedgerEntry>>;

    // --- Request idempotency ---

    /// Looks up the job a (key, scope) pair previously produced.
    async fn find_submission(&self, key: &str, scope: &str) -> Result<Option<JobId>>;

    /// Remembers that a (key, scope) pair produced `job_id`.
    ///
    /// A pair that is already present is left untouched.
    async fn remember_submission(&self, key: &str, scope: &str, job_id: &JobId) -> Result<()>;
}
