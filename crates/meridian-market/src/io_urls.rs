//! Per-job input/output location allocation.
//!
//! Workers exchange data with the platform through pre-authorized upload and
//! download URLs plus stable input/output URIs. Allocation is deterministic
//! per job apart from the expiry timestamp.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use meridian_core::JobId;

/// How long allocated URLs stay valid.
const URL_TTL_SECONDS: i64 = 3600;

/// Pre-authorized I/O locations for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoUrls {
    /// URL the submitter uploads inputs to.
    pub upload_url: String,
    /// URL the submitter downloads outputs from.
    pub download_url: String,
    /// URI workers read inputs from.
    pub input_uri: String,
    /// URI workers write outputs to.
    pub output_uri: String,
    /// When the upload/download URLs expire.
    pub expires_at: DateTime<Utc>,
}

/// Allocates I/O locations against a storage base URL.
#[derive(Debug, Clone)]
pub struct IoUrlAllocator {
    base_url: String,
}

impl IoUrlAllocator {
    /// Creates an allocator for the given storage base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Allocates I/O locations for a job.
    #[must_use]
    pub fn allocate(&self, job_id: JobId) -> IoUrls {
        let token = format!("token-{job_id}");
        IoUrls {
            upload_url: format!("{}/upload?job={job_id}&t={token}", self.base_url),
            download_url: format!("{}/download?job={job_id}&t={token}", self.base_url),
            input_uri: format!("s3://tenant/{job_id}/input/"),
            output_uri: format!("s3://tenant/{job_id}/output/"),
            expires_at: Utc::now() + Duration::seconds(URL_TTL_SECONDS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_embed_the_job_id() {
        let allocator = IoUrlAllocator::new("https://storage.internal");
        let job_id = JobId::generate();
        let urls = allocator.allocate(job_id);

        assert!(urls.upload_url.contains(&job_id.to_string()));
        assert!(urls.download_url.starts_with("https://storage.internal/download"));
        assert_eq!(urls.input_uri, format!("s3://tenant/{job_id}/input/"));
        assert!(urls.expires_at > Utc::now());
    }
}
