//! End-to-end tests for the submission workflow and its background loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;

use meridian_core::UserId;
use meridian_market::bus::memory::InMemoryBus;
use meridian_market::config::MarketConfig;
use meridian_market::error::{Error, Result};
use meridian_market::job::{Job, JobStatus};
use meridian_market::ledger::{EntryKind, Ledger, PostingSide};
use meridian_market::orchestrator::JobOrchestrator;
use meridian_market::outbox::OutboxRelay;
use meridian_market::provider::fake::FakeProvider;
use meridian_market::provider::{ProviderClient, ProviderRegistry, ProvisionReceipt, UsageReport};
use meridian_market::quotes::{QuoteService, StaticQuoteFetcher};
use meridian_market::selection::BalancedPolicy;
use meridian_market::store::memory::InMemoryStore;
use meridian_market::store::Store;
use meridian_market::sweeper::ReconciliationSweeper;

/// A provider whose provision or start calls can be made to fail.
struct FlakyProvider {
    fail_provision: AtomicBool,
    fail_start: AtomicBool,
}

impl FlakyProvider {
    fn reliable() -> Self {
        Self {
            fail_provision: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
        }
    }

    fn failing_provision() -> Self {
        let provider = Self::reliable();
        provider.fail_provision.store(true, Ordering::SeqCst);
        provider
    }

    fn failing_start() -> Self {
        let provider = Self::reliable();
        provider.fail_start.store(true, Ordering::SeqCst);
        provider
    }
}

#[async_trait::async_trait]
impl ProviderClient for FlakyProvider {
    async fn provision(&self, _job: &Job) -> Result<ProvisionReceipt> {
        if self.fail_provision.load(Ordering::SeqCst) {
            return Err(Error::provider("flaky", "no capacity"));
        }
        Ok(ProvisionReceipt {
            instance_id: "flaky-1".to_string(),
        })
    }

    async fn start(&self, _instance_id: &str) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::provider("flaky", "start rejected"));
        }
        Ok(())
    }

    async fn stop(&self, _instance_id: &str) -> Result<()> {
        Ok(())
    }

    async fn collect_usage(&self, _instance_id: &str) -> Result<UsageReport> {
        Ok(UsageReport {
            runtime_seconds: 0,
            cost_estimate: 0.0,
        })
    }
}

struct Fixture {
    store: Arc<InMemoryStore>,
    bus: Arc<InMemoryBus>,
    orchestrator: JobOrchestrator,
}

/// Builds an orchestrator over in-memory collaborators.
///
/// `offers` maps provider labels to (price, latency, reliability);
/// `register` names which of those labels get a working client.
fn fixture_with(
    config: MarketConfig,
    offers: Vec<(String, f64, f64, f64)>,
    register: &[(&str, Arc<dyn ProviderClient>)],
) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let quotes = Arc::new(QuoteService::new(
        Arc::new(StaticQuoteFetcher::with_offers(offers)),
        config.quote_ttl,
        config.quote_cache_capacity,
    ));
    let mut providers = ProviderRegistry::new();
    for (label, client) in register {
        providers.register(*label, client.clone());
    }

    let orchestrator = JobOrchestrator::new(
        store.clone(),
        Ledger::new(store.clone()),
        quotes,
        Arc::new(BalancedPolicy),
        providers,
        config,
    );
    Fixture {
        store,
        bus,
        orchestrator,
    }
}

fn fixture() -> Fixture {
    // One offer, so "fake" always wins selection.
    fixture_with(
        MarketConfig::default(),
        vec![("fake".to_string(), 0.50, 800.0, 0.98)],
        &[("fake", Arc::new(FakeProvider::new()))],
    )
}

fn draft_job() -> Job {
    Job::new(
        UserId::generate(),
        json!({"image": "trainer:v2"}),
        json!({}),
        Some(Decimal::new(100, 0)),
    )
}

#[tokio::test]
async fn successful_submission_runs_the_job() -> Result<()> {
    let fx = fixture();
    let job = fx.orchestrator.submit(draft_job()).await?;

    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.provider.as_deref(), Some("fake"));
    assert!(job.started_at.is_some());

    // Both milestones are in the outbox, neither delivered yet.
    let rows = fx.store.outbox_for_job(&job.id)?;
    let types: Vec<&str> = rows.iter().map(|r| r.event_type.as_str()).collect();
    assert_eq!(types, vec!["JobSubmitted", "JobStarted"]);
    assert!(rows.iter().all(|r| !r.is_processed()));

    // Exactly one hold, sized 0.50 * 1.2, balanced across two legs.
    let entries = fx.store.entries_for_job(&job.id).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::Hold);
    let postings = fx.store.postings_for_entry(&entries[0].id).await?;
    assert_eq!(postings.len(), 2);
    let expected = Decimal::new(60, 2);
    assert!(postings.iter().all(|p| p.amount.round_dp(2) == expected));
    let debits: Decimal = postings
        .iter()
        .filter(|p| p.side == PostingSide::Debit)
        .map(|p| p.amount)
        .sum();
    let credits: Decimal = postings
        .iter()
        .filter(|p| p.side == PostingSide::Credit)
        .map(|p| p.amount)
        .sum();
    assert_eq!(debits, credits);
    Ok(())
}

#[tokio::test]
async fn get_returns_the_persisted_job() -> Result<()> {
    let fx = fixture();
    let job = fx.orchestrator.submit(draft_job()).await?;

    let fetched = fx.orchestrator.get(job.id).await?;
    assert_eq!(fetched.id, job.id);
    assert_eq!(fetched.status, JobStatus::Running);
    Ok(())
}

#[tokio::test]
async fn get_unknown_job_is_not_found() {
    let fx = fixture();
    let err = fx
        .orchestrator
        .get(meridian_core::JobId::generate())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::JobNotFound { .. }));
}

#[tokio::test]
async fn unregistered_provider_fails_the_job_and_keeps_the_hold() -> Result<()> {
    // The quote names a provider nothing was registered under.
    let fx = fixture_with(
        MarketConfig::default(),
        vec![("ghost".to_string(), 0.50, 800.0, 0.98)],
        &[],
    );
    let draft = draft_job();
    let job_user = draft.user_id;

    let err = fx.orchestrator.submit(draft).await.unwrap_err();
    assert!(matches!(err, Error::ProviderNotRegistered { ref provider } if provider == "ghost"));

    // The job failed, but the hold posted before resolution stays put.
    let stuck = fx
        .store
        .list_jobs_stuck_in(JobStatus::Failed, chrono::Utc::now() + chrono::Duration::seconds(1))
        .await?;
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].user_id, job_user);
    let entries = fx.store.entries_for_job(&stuck[0].id).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::Hold);
    Ok(())
}

#[tokio::test]
async fn provision_failure_fails_the_job_without_compensation_by_default() -> Result<()> {
    let fx = fixture_with(
        MarketConfig::default(),
        vec![("flaky".to_string(), 0.50, 800.0, 0.98)],
        &[("flaky", Arc::new(FlakyProvider::failing_provision()))],
    );

    let err = fx.orchestrator.submit(draft_job()).await.unwrap_err();
    assert!(matches!(err, Error::Provider { .. }));

    let failed = fx
        .store
        .list_jobs_stuck_in(JobStatus::Failed, chrono::Utc::now() + chrono::Duration::seconds(1))
        .await?;
    assert_eq!(failed.len(), 1);

    // The hold is not compensated: one entry, and it is the hold.
    let entries = fx.store.entries_for_job(&failed[0].id).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::Hold);
    Ok(())
}

#[tokio::test]
async fn provision_failure_refunds_when_configured() -> Result<()> {
    let config = MarketConfig {
        refund_on_provision_failure: true,
        ..MarketConfig::default()
    };
    let fx = fixture_with(
        config,
        vec![("flaky".to_string(), 0.50, 800.0, 0.98)],
        &[("flaky", Arc::new(FlakyProvider::failing_start()))],
    );

    let err = fx.orchestrator.submit(draft_job()).await.unwrap_err();
    assert!(matches!(err, Error::Provider { .. }));

    let failed = fx
        .store
        .list_jobs_stuck_in(JobStatus::Failed, chrono::Utc::now() + chrono::Duration::seconds(1))
        .await?;
    let entries = fx.store.entries_for_job(&failed[0].id).await?;
    let kinds: Vec<EntryKind> = entries.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EntryKind::Hold));
    assert!(kinds.contains(&EntryKind::Refund));
    assert_eq!(entries.len(), 2);
    Ok(())
}

#[tokio::test]
async fn no_quotes_is_a_hard_failure() {
    let fx = fixture_with(MarketConfig::default(), vec![], &[]);
    let err = fx.orchestrator.submit(draft_job()).await.unwrap_err();
    assert!(matches!(err, Error::EmptyQuoteSet { .. }));
}

#[tokio::test]
async fn relay_delivers_the_submission_milestones() -> Result<()> {
    let fx = fixture();
    let job = fx.orchestrator.submit(draft_job()).await?;

    let relay = OutboxRelay::new(fx.store.clone(), fx.bus.clone(), 50);
    let summary = relay.run_cycle().await?;
    assert_eq!(summary.published, 2);

    assert_eq!(
        fx.bus.routing_keys()?,
        vec!["job.jobsubmitted".to_string(), "job.jobstarted".to_string()]
    );
    assert!(fx
        .store
        .outbox_for_job(&job.id)?
        .iter()
        .all(meridian_market::events::OutboxEvent::is_processed));
    Ok(())
}

#[tokio::test]
async fn sweeper_and_submissions_do_not_corrupt_each_other() -> Result<()> {
    let fx = fixture();
    let sweeper = ReconciliationSweeper::new(fx.store.clone(), chrono::Duration::minutes(5));

    let (a, b, sweep) = tokio::join!(
        fx.orchestrator.submit(draft_job()),
        fx.orchestrator.submit(draft_job()),
        sweeper.run_cycle(),
    );
    let a = a?;
    let b = b?;
    sweep?;

    for job in [&a, &b] {
        let stored = fx.store.get_job(&job.id).await?.unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        assert_eq!(stored.provider.as_deref(), Some("fake"));
        assert_eq!(fx.store.outbox_for_job(&job.id)?.len(), 2);
        assert_eq!(fx.store.entries_for_job(&job.id).await?.len(), 1);
    }
    assert_ne!(a.id, b.id);
    Ok(())
}

#[tokio::test]
async fn submission_replay_hook_returns_current_status() -> Result<()> {
    use meridian_market::idempotency::SubmissionKeys;

    let fx = fixture();
    let keys = SubmissionKeys::new(fx.store.clone());

    // First request: no key recorded, submit, remember.
    assert_eq!(keys.find("req-1").await?, None);
    let job = fx.orchestrator.submit(draft_job()).await?;
    keys.remember("req-1", job.id).await?;

    // Replay: the recorded job is fetched instead of resubmitted.
    let replayed = keys.find("req-1").await?.unwrap();
    let current = fx.orchestrator.get(replayed).await?;
    assert_eq!(current.id, job.id);
    assert_eq!(current.status, JobStatus::Running);
    Ok(())
}
