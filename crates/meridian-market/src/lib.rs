//! # meridian-market
//!
//! Control plane for the Meridian compute-job marketplace.
//!
//! This crate implements the submission workflow and the subsystems that
//! keep job state, ledger state, and published events mutually consistent
//! under partial failure:
//!
//! - **Job Orchestrator**: The submission saga, from acceptance to a running
//!   provider instance
//! - **Ledger**: Double-entry bookkeeping with idempotent holds, debits, and
//!   refunds
//! - **Outbox Relay**: Transactional-outbox delivery of domain events to the
//!   bus
//! - **Reconciliation Sweeper**: Timeout-based repair of jobs stuck without
//!   a provisioning outcome
//! - **Selection Policy & Quote Source**: Cached provider quotes scored into
//!   one provisioning decision
//!
//! ## Guarantees
//!
//! - **Balanced books**: Every ledger entry posts two legs of equal amount
//!   on opposite sides
//! - **Exactly-once economics**: Duplicate ledger tokens are absorbed as
//!   no-ops
//! - **No lost events**: Outbox rows commit in the same transaction as the
//!   state they describe; delivery is at-least-once
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use meridian_core::UserId;
//! use meridian_market::config::MarketConfig;
//! use meridian_market::job::Job;
//! use meridian_market::ledger::Ledger;
//! use meridian_market::orchestrator::JobOrchestrator;
//! use meridian_market::provider::fake::FakeProvider;
//! use meridian_market::provider::ProviderRegistry;
//! use meridian_market::quotes::{QuoteService, StaticQuoteFetcher};
//! use meridian_market::selection::BalancedPolicy;
//! use meridian_market::store::memory::InMemoryStore;
//!
//! # async fn example() -> meridian_market::error::Result<()> {
//! let config = MarketConfig::default();
//! let store = Arc::new(InMemoryStore::new());
//! let quotes = Arc::new(QuoteService::new(
//!     Arc::new(StaticQuoteFetcher::new()),
//!     config.quote_ttl,
//!     config.quote_cache_capacity,
//! ));
//! let mut providers = ProviderRegistry::new();
//! providers.register("fake", Arc::new(FakeProvider::new()));
//!
//! let orchestrator = JobOrchestrator::new(
//!     store.clone(),
//!     Ledger::new(store),
//!     quotes,
//!     Arc::new(BalancedPolicy),
//!     providers,
//!     config,
//! );
//!
//! let job = Job::new(
//!     UserId::generate(),
//!     serde_json::json!({"image": "trainer:v2"}),
//!     serde_json::json!({}),
//!     None,
//! );
//! let _running = orchestrator.submit(job).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod idempotency;
pub mod io_urls;
pub mod job;
pub mod ledger;
pub mod metrics;
pub mod orchestrator;
pub mod outbox;
pub mod provider;
pub mod quotes;
pub mod selection;
pub mod store;
pub mod sweeper;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bus::EventBus;
    pub use crate::config::MarketConfig;
    pub use crate::error::{Error, Result};
    pub use crate::events::{DomainEvent, OutboxEvent};
    pub use crate::idempotency::SubmissionKeys;
    pub use crate::job::{Job, JobStatus};
    pub use crate::ledger::{EntryKind, Ledger, LedgerEntry, LedgerPosting, PostingSide};
    pub use crate::orchestrator::JobOrchestrator;
    pub use crate::outbox::OutboxRelay;
    pub use crate::provider::{ProviderClient, ProviderRegistry, ProvisionReceipt, UsageReport};
    pub use crate::quotes::{Quote, QuoteFetcher, QuoteService};
    pub use crate::selection::{BalancedPolicy, SelectionPolicy};
    pub use crate::store::{CasResult, EntryInsert, Store};
    pub use crate::sweeper::ReconciliationSweeper;
}
