//! Provider client speaking the standard provisioning REST surface.
//!
//! Providers that expose the common HTTP contract are integrated through
//! this one client pointed at their base URL:
//!
//! - `POST {base}/provision` with the job ID, returns the instance ID
//! - `POST {base}/start` / `POST {base}/stop` with the instance ID
//! - `GET {base}/usage/{instance}` returns the usage report

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{ProviderClient, ProvisionReceipt, UsageReport};
use crate::error::{Error, Result};
use crate::job::Job;

/// Provider client over the shared REST provisioning contract.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    label: String,
    base_url: String,
    client: Client,
}

impl HttpProvider {
    /// Creates a client for the provider at `base_url`.
    ///
    /// `label` names the provider in errors and must match its registry key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(label: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            label: label.into(),
            base_url: base_url.into(),
            client,
        })
    }

    fn provider_err(&self, context: &str, err: impl std::fmt::Display) -> Error {
        Error::provider(&self.label, format!("{context}: {err}"))
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.provider_err(path, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(self.provider_err(path, format!("status {status}: {message}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl ProviderClient for HttpProvider {
    async fn provision(&self, job: &Job) -> Result<ProvisionReceipt> {
        let body = serde_json::json!({ "jobId": job.id });
        let response = self.post("/provision", &body).await?;
        let instance_id = response
            .text()
            .await
            .map_err(|e| self.provider_err("/provision", e))?;
        if instance_id.is_empty() {
            return Err(self.provider_err("/provision", "empty instance ID"));
        }
        Ok(ProvisionReceipt { instance_id })
    }

    async fn start(&self, instance_id: &str) -> Result<()> {
        let body = serde_json::json!({ "instanceId": instance_id });
        self.post("/start", &body).await?;
        Ok(())
    }

    async fn stop(&self, instance_id: &str) -> Result<()> {
        let body = serde_json::json!({ "instanceId": instance_id });
        self.post("/stop", &body).await?;
        Ok(())
    }

    async fn collect_usage(&self, instance_id: &str) -> Result<UsageReport> {
        let url = format!("{}/usage/{instance_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.provider_err("/usage", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.provider_err("/usage", format!("status {status}")));
        }

        response
            .json::<UsageReport>()
            .await
            .map_err(|e| self.provider_err("/usage", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::UserId;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_job() -> Job {
        Job::new(UserId::generate(), json!({}), json!({}), None)
    }

    #[tokio::test]
    async fn provision_then_start() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/provision"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pod-42"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpProvider::new("runpod", server.uri())?;
        let receipt = provider.provision(&sample_job()).await?;
        assert_eq!(receipt.instance_id, "pod-42");
        provider.start(&receipt.instance_id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn provision_failure_is_a_provider_error() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/provision"))
            .respond_with(ResponseTemplate::new(503).set_body_string("no capacity"))
            .mount(&server)
            .await;

        let provider = HttpProvider::new("runpod", server.uri())?;
        let err = provider.provision(&sample_job()).await.unwrap_err();
        assert!(matches!(err, Error::Provider { ref provider, .. } if provider == "runpod"));
        assert!(err.to_string().contains("no capacity"));
        Ok(())
    }

    #[tokio::test]
    async fn collect_usage_parses_report() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/usage/pod-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "runtimeSeconds": 600,
                "costEstimate": 7.23
            })))
            .mount(&server)
            .await;

        let provider = HttpProvider::new("runpod", server.uri())?;
        let usage = provider.collect_usage("pod-42").await?;
        assert_eq!(usage.runtime_seconds, 600);
        assert!((usage.cost_estimate - 7.23).abs() < f64::EPSILON);
        Ok(())
    }
}
