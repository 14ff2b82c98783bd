//! Error types for the marketplace control plane.

use meridian_core::JobId;

use crate::job::JobStatus;

/// The result type used throughout meridian-market.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in control-plane operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A job was not found.
    #[error("job not found: {job_id}")]
    JobNotFound {
        /// The job ID that was looked up.
        job_id: JobId,
    },

    /// An invalid job status transition was attempted.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        /// The current status.
        from: JobStatus,
        /// The attempted target status.
        to: JobStatus,
    },

    /// The quote source returned no quotes to choose from.
    #[error("no quotes available for {region}/{resource_type}")]
    EmptyQuoteSet {
        /// The region that was quoted.
        region: String,
        /// The resource type that was quoted.
        resource_type: String,
    },

    /// No provider capability is registered under the selected label.
    #[error("no provider registered under '{provider}'")]
    ProviderNotRegistered {
        /// The provider label from the chosen quote.
        provider: String,
    },

    /// A provider call failed.
    #[error("provider '{provider}' error: {message}")]
    Provider {
        /// The provider that failed.
        provider: String,
        /// Description of the failure.
        message: String,
    },

    /// A ledger entry's postings do not balance.
    #[error("unbalanced entry: debits {debits} != credits {credits}")]
    UnbalancedEntry {
        /// Sum of debit-side amounts.
        debits: rust_decimal::Decimal,
        /// Sum of credit-side amounts.
        credits: rust_decimal::Decimal,
    },

    /// A monetary amount was rejected.
    #[error("invalid amount: {message}")]
    InvalidAmount {
        /// Description of what made the amount invalid.
        message: String,
    },

    /// Publishing to the event bus failed.
    #[error("publish failed for '{routing_key}': {message}")]
    Publish {
        /// The routing key the publish was attempted under.
        routing_key: String,
        /// Description of the failure.
        message: String,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// A configuration value was missing or malformed.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An error from meridian-core.
    #[error("core error: {0}")]
    Core(#[from] meridian_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new provider error.
    #[must_use]
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}
