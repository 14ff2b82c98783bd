//! Provider capability abstraction.
//!
//! Each external compute provider is integrated behind [`ProviderClient`]:
//! provision an instance for a job, start it, stop it, and collect usage.
//! The orchestrator resolves clients through a [`ProviderRegistry`] keyed by
//! the provider label carried on quotes; the registry is populated once at
//! startup, and a missing key is a configuration error rather than a lookup
//! surprise.

pub mod fake;
pub mod http;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::job::Job;

/// Receipt from provisioning an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionReceipt {
    /// Provider-scoped instance identifier.
    pub instance_id: String,
}

/// Usage collected from a provider for one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    /// Seconds the instance has run.
    pub runtime_seconds: u64,
    /// The provider's cost estimate in USD.
    pub cost_estimate: f64,
}

/// Capability surface one provider integration must offer.
///
/// Any call may fail with a provider error; the orchestrator treats
/// provision/start failures as terminal for the submission.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provisions an instance able to run `job`.
    async fn provision(&self, job: &Job) -> Result<ProvisionReceipt>;

    /// Starts a provisioned instance.
    async fn start(&self, instance_id: &str) -> Result<()>;

    /// Stops a running instance.
    async fn stop(&self, instance_id: &str) -> Result<()>;

    /// Collects the current usage report for an instance.
    async fn collect_usage(&self, instance_id: &str) -> Result<UsageReport>;
}

/// Name-keyed collection of provider clients, populated at startup.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<String, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client under `label`, replacing any previous entry.
    pub fn register(&mut self, label: impl Into<String>, client: Arc<dyn ProviderClient>) {
        self.clients.insert(label.into(), client);
    }

    /// Resolves the client registered under `label`.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(label).cloned()
    }

    /// Returns the registered labels, sorted.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.clients.keys().cloned().collect();
        labels.sort();
        labels
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("labels", &self.labels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeProvider;
    use super::*;

    #[test]
    fn registry_resolves_by_label() {
        let mut registry = ProviderRegistry::new();
        registry.register("fake", Arc::new(FakeProvider::new()));

        assert!(registry.get("fake").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.labels(), vec!["fake".to_string()]);
    }

    #[test]
    fn registering_twice_replaces() {
        let mut registry = ProviderRegistry::new();
        registry.register("fake", Arc::new(FakeProvider::new()));
        registry.register("fake", Arc::new(FakeProvider::new()));
        assert_eq!(registry.labels().len(), 1);
    }
}
