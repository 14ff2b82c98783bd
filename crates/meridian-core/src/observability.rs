//! Observability infrastructure for Meridian.
//!
//! Structured logging with consistent spans across all components. This
//! module provides initialization helpers and a span constructor for the
//! submission path.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl LogFormat {
    /// Resolves the format from a `MERIDIAN_LOG_FORMAT`-style value.
    ///
    /// Anything other than a case-insensitive `json` resolves to
    /// [`LogFormat::Pretty`].
    #[must_use]
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `meridian_market=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for submission-path operations with standard fields.
///
/// # Example
///
/// ```rust
/// use meridian_core::observability::submission_span;
///
/// let span = submission_span("submit", "01ARZ3NDEKTSV4RRFFQ69G5FAV");
/// let _guard = span.enter();
/// // ... drive the submission
/// ```
#[must_use]
pub fn submission_span(operation: &str, job_id: &str) -> Span {
    tracing::info_span!("submission", op = operation, job_id = job_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json);
    }

    #[test]
    fn log_format_from_env_value() {
        assert!(matches!(
            LogFormat::from_env_value(Some("JSON")),
            LogFormat::Json
        ));
        assert!(matches!(
            LogFormat::from_env_value(Some("pretty")),
            LogFormat::Pretty
        ));
        assert!(matches!(LogFormat::from_env_value(None), LogFormat::Pretty));
    }
}
