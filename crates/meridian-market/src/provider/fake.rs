//! A provider client that provisions nothing.
//!
//! Useful for development, tests, and as the control group when validating
//! orchestration changes. Instances exist in name only; usage reports are
//! fixed.

use async_trait::async_trait;
use ulid::Ulid;

use super::{ProviderClient, ProvisionReceipt, UsageReport};
use crate::error::Result;
use crate::job::Job;

/// Fixed runtime the fake reports for any instance.
const FAKE_RUNTIME_SECONDS: u64 = 600;

/// Fixed cost estimate the fake reports for any instance.
const FAKE_COST_ESTIMATE: f64 = 7.23;

/// No-op provider client.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeProvider;

impl FakeProvider {
    /// Creates a fake provider client.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn provision(&self, _job: &Job) -> Result<ProvisionReceipt> {
        Ok(ProvisionReceipt {
            instance_id: format!("fake-{}", Ulid::new()),
        })
    }

    async fn start(&self, _instance_id: &str) -> Result<()> {
        Ok(())
    }

    async fn stop(&self, _instance_id: &str) -> Result<()> {
        Ok(())
    }

    async fn collect_usage(&self, _instance_id: &str) -> Result<UsageReport> {
        Ok(UsageReport {
            runtime_seconds: FAKE_RUNTIME_SECONDS,
            cost_estimate: FAKE_COST_ESTIMATE,
        })
    }
}
