//! The submission saga.
//!
//! `submit` drives one job from acceptance to a running provider instance:
//!
//! 1. Persist the job at QUEUED together with its `JobSubmitted` outbox row.
//! 2. Fetch quotes for the job's region/resource class and pick one.
//! 3. Reserve funds: a ledger hold for the quoted cost times the safety
//!    margin, under a fresh idempotency token. The hold always lands before
//!    any provider is asked to provision, because provisioning has
//!    real-world cost.
//! 4. Resolve the provider client from the registry; a missing registration
//!    fails the job.
//! 5. Provision, then start. Failure here is terminal for the submission.
//! 6. Persist RUNNING with the provider label, `started_at`, and the
//!    `JobStarted` outbox row.
//!
//! A provisioning failure leaves the hold in place unless
//! `refund_on_provision_failure` is set; see [`crate::config::MarketConfig`].

use std::sync::Arc;

use rust_decimal::Decimal;
use ulid::Ulid;

use meridian_core::JobId;

use crate::config::MarketConfig;
use crate::error::{Error, Result};
use crate::events::{DomainEvent, OutboxEvent};
use crate::job::{Job, JobStatus};
use crate::ledger::Ledger;
use crate::provider::ProviderRegistry;
use crate::quotes::QuoteService;
use crate::selection::SelectionPolicy;
use crate::store::Store;

/// Coordinates the submission workflow for one job at a time.
pub struct JobOrchestrator {
    store: Arc<dyn Store>,
    ledger: Ledger,
    quotes: Arc<QuoteService>,
    policy: Arc<dyn SelectionPolicy>,
    providers: ProviderRegistry,
    config: MarketConfig,
}

impl JobOrchestrator {
    /// Creates an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Ledger,
        quotes: Arc<QuoteService>,
        policy: Arc<dyn SelectionPolicy>,
        providers: ProviderRegistry,
        config: MarketConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            quotes,
            policy,
            providers,
            config,
        }
    }

    /// Submits a job and drives it to RUNNING.
    ///
    /// Returns the persisted job. On configuration and provider failures the
    /// job is persisted as FAILED and the error propagates to the caller.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyQuoteSet`] when no quotes are available
    /// - [`Error::ProviderNotRegistered`] when the chosen quote names an
    ///   unknown provider
    /// - [`Error::Provider`] when provisioning or starting fails
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id, user_id = %job.user_id))]
    pub async fn submit(&self, mut job: Job) -> Result<Job> {
        job.transition_to(JobStatus::Queued)?;
        let submitted = OutboxEvent::for_job(
            &job,
            &DomainEvent::JobSubmitted {
                job_id: job.id,
                user_id: job.user_id,
            },
        )?;
        self.store.insert_job(&job, submitted).await?;
        crate::metrics::record_job_submitted();

        let region = job
            .hinted_region()
            .unwrap_or(&self.config.default_region)
            .to_string();
        let resource_type = job
            .hinted_resource_type()
            .unwrap_or(&self.config.default_resource_type)
            .to_string();

        let quotes = self.quotes.get_quotes(&region, &resource_type).await?;
        if quotes.is_empty() {
            return Err(Error::EmptyQuoteSet {
                region,
                resource_type,
            });
        }
        let choice = self.policy.pick(&quotes)?.clone();
        tracing::info!(
            provider = %choice.provider,
            hourly_price = choice.hourly_price,
            "provider selected"
        );

        let hold_amount = self.config.hold_amount(choice.hourly_price)?;
        let hold_token = Ulid::new().to_string();
        self.ledger
            .hold(&hold_token, job.user_id, hold_amount, job.id)
            .await?;

        let Some(client) = self.providers.get(&choice.provider) else {
            self.fail_job(&mut job).await?;
            crate::metrics::record_job_failed("provider_not_registered");
            return Err(Error::ProviderNotRegistered {
                provider: choice.provider,
            });
        };

        let receipt = match client.provision(&job).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.abandon_provisioning(&mut job, &choice.provider, hold_amount)
                    .await?;
                return Err(e);
            }
        };
        if let Err(e) = client.start(&receipt.instance_id).await {
            self.abandon_provisioning(&mut job, &choice.provider, hold_amount)
                .await?;
            return Err(e);
        }

        job.transition_to(JobStatus::Running)?;
        job.assign_provider(&choice.provider)?;
        let started = OutboxEvent::for_job(
            &job,
            &DomainEvent::JobStarted {
                job_id: job.id,
                user_id: job.user_id,
                provider: choice.provider.clone(),
            },
        )?;
        self.store.update_job(&job, Some(started)).await?;

        tracing::info!(instance_id = %receipt.instance_id, "job running");
        Ok(job)
    }

    /// Gets a job by ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobNotFound`] if no such job exists.
    pub async fn get(&self, id: JobId) -> Result<Job> {
        self.store
            .get_job(&id)
            .await?
            .ok_or(Error::JobNotFound { job_id: id })
    }

    /// Marks the job FAILED and persists it, without touching the ledger.
    async fn fail_job(&self, job: &mut Job) -> Result<()> {
        job.transition_to(JobStatus::Failed)?;
        self.store.update_job(job, None).await
    }

    /// Fails the job after a provider error, optionally compensating the
    /// hold.
    async fn abandon_provisioning(
        &self,
        job: &mut Job,
        provider: &str,
        hold_amount: Decimal,
    ) -> Result<()> {
        crate::metrics::record_job_failed("provider");
        tracing::error!(provider, "provisioning failed, failing job");

        if self.config.refund_on_provision_failure {
            let refund_token = Ulid::new().to_string();
            self.ledger
                .refund(&refund_token, job.user_id, hold_amount, job.id)
                .await?;
        }
        self.fail_job(job).await
    }
}
