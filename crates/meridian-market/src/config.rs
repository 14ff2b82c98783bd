//! Runtime configuration for the control plane.
//!
//! Defaults match the reference deployment; every knob can be overridden
//! from the process environment. Parsing is strict: a present but malformed
//! value is a configuration error, not a silent fallback.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::{Error, Result};

const ENV_RELAY_INTERVAL_SECS: &str = "MERIDIAN_RELAY_INTERVAL_SECS";
const ENV_RELAY_BATCH_SIZE: &str = "MERIDIAN_RELAY_BATCH_SIZE";
const ENV_SWEEPER_INTERVAL_SECS: &str = "MERIDIAN_SWEEPER_INTERVAL_SECS";
const ENV_QUEUED_STALE_AFTER_SECS: &str = "MERIDIAN_QUEUED_STALE_AFTER_SECS";
const ENV_QUOTE_TTL_SECS: &str = "MERIDIAN_QUOTE_TTL_SECS";
const ENV_QUOTE_CACHE_CAPACITY: &str = "MERIDIAN_QUOTE_CACHE_CAPACITY";
const ENV_DEFAULT_REGION: &str = "MERIDIAN_DEFAULT_REGION";
const ENV_DEFAULT_RESOURCE_TYPE: &str = "MERIDIAN_DEFAULT_RESOURCE_TYPE";
const ENV_REFUND_ON_PROVISION_FAILURE: &str = "MERIDIAN_REFUND_ON_PROVISION_FAILURE";

const DEFAULT_RELAY_INTERVAL_SECS: u64 = 2;
const DEFAULT_RELAY_BATCH_SIZE: u64 = 50;
const DEFAULT_SWEEPER_INTERVAL_SECS: u64 = 30;
const DEFAULT_QUEUED_STALE_AFTER_SECS: u64 = 300;
const DEFAULT_QUOTE_TTL_SECS: u64 = 45;
const DEFAULT_QUOTE_CACHE_CAPACITY: u64 = 1000;
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_RESOURCE_TYPE: &str = "A100-80G";

/// Safety margin applied to the chosen quote when sizing a hold.
pub const HOLD_SAFETY_MARGIN: f64 = 1.2;

/// Control-plane runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketConfig {
    /// How often the outbox relay runs a cycle.
    pub relay_interval: Duration,
    /// Maximum outbox rows drained per relay cycle.
    pub relay_batch_size: usize,
    /// How often the reconciliation sweeper runs a cycle.
    pub sweeper_interval: Duration,
    /// How long a job may sit QUEUED before the sweeper repairs it.
    pub queued_stale_after: chrono::Duration,
    /// Quote cache time-to-live.
    pub quote_ttl: Duration,
    /// Maximum distinct quote-cache keys.
    pub quote_cache_capacity: usize,
    /// Region used when a job's resource hint names none.
    pub default_region: String,
    /// Resource type used when a job's resource hint names none.
    pub default_resource_type: String,
    /// Whether a failed provision posts a compensating refund for its hold.
    ///
    /// Off by default: the hold stays in place for external reconciliation.
    pub refund_on_provision_failure: bool,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            relay_interval: Duration::from_secs(DEFAULT_RELAY_INTERVAL_SECS),
            relay_batch_size: DEFAULT_RELAY_BATCH_SIZE as usize,
            sweeper_interval: Duration::from_secs(DEFAULT_SWEEPER_INTERVAL_SECS),
            queued_stale_after: chrono::Duration::seconds(DEFAULT_QUEUED_STALE_AFTER_SECS as i64),
            quote_ttl: Duration::from_secs(DEFAULT_QUOTE_TTL_SECS),
            quote_cache_capacity: DEFAULT_QUOTE_CACHE_CAPACITY as usize,
            default_region: DEFAULT_REGION.to_string(),
            default_resource_type: DEFAULT_RESOURCE_TYPE.to_string(),
            refund_on_provision_failure: false,
        }
    }
}

impl MarketConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a present value is not a positive
    /// integer (for the numeric knobs) or not a boolean (for the refund
    /// flag).
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration with a custom environment source.
    ///
    /// This entry point is test-friendly and accepts a key lookup function.
    ///
    /// # Errors
    ///
    /// Same conditions as [`MarketConfig::from_env`].
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let relay_interval_secs =
            parse_positive_u64_env(&get_env, ENV_RELAY_INTERVAL_SECS, DEFAULT_RELAY_INTERVAL_SECS)?;
        let relay_batch_size =
            parse_positive_u64_env(&get_env, ENV_RELAY_BATCH_SIZE, DEFAULT_RELAY_BATCH_SIZE)?;
        let sweeper_interval_secs = parse_positive_u64_env(
            &get_env,
            ENV_SWEEPER_INTERVAL_SECS,
            DEFAULT_SWEEPER_INTERVAL_SECS,
        )?;
        let queued_stale_after_secs = parse_positive_u64_env(
            &get_env,
            ENV_QUEUED_STALE_AFTER_SECS,
            DEFAULT_QUEUED_STALE_AFTER_SECS,
        )?;
        let quote_ttl_secs =
            parse_positive_u64_env(&get_env, ENV_QUOTE_TTL_SECS, DEFAULT_QUOTE_TTL_SECS)?;
        let quote_cache_capacity = parse_positive_u64_env(
            &get_env,
            ENV_QUOTE_CACHE_CAPACITY,
            DEFAULT_QUOTE_CACHE_CAPACITY,
        )?;

        let queued_stale_after =
            chrono::Duration::seconds(i64::try_from(queued_stale_after_secs).map_err(|_| {
                Error::configuration(format!(
                    "{ENV_QUEUED_STALE_AFTER_SECS} value {queued_stale_after_secs} exceeds supported range"
                ))
            })?);

        Ok(Self {
            relay_interval: Duration::from_secs(relay_interval_secs),
            relay_batch_size: usize::try_from(relay_batch_size).unwrap_or(usize::MAX),
            sweeper_interval: Duration::from_secs(sweeper_interval_secs),
            queued_stale_after,
            quote_ttl: Duration::from_secs(quote_ttl_secs),
            quote_cache_capacity: usize::try_from(quote_cache_capacity).unwrap_or(usize::MAX),
            default_region: get_env(ENV_DEFAULT_REGION).unwrap_or(defaults.default_region),
            default_resource_type: get_env(ENV_DEFAULT_RESOURCE_TYPE)
                .unwrap_or(defaults.default_resource_type),
            refund_on_provision_failure: parse_bool_env(
                &get_env,
                ENV_REFUND_ON_PROVISION_FAILURE,
                defaults.refund_on_provision_failure,
            )?,
        })
    }

    /// The hold amount for a quote's estimated hourly cost.
    ///
    /// # Errors
    ///
    /// Returns an error if the price is not a finite non-negative number.
    pub fn hold_amount(&self, hourly_price: f64) -> Result<Decimal> {
        let raw = hourly_price * HOLD_SAFETY_MARGIN;
        if !raw.is_finite() || raw < 0.0 {
            return Err(Error::InvalidAmount {
                message: format!("cannot size a hold from price {hourly_price}"),
            });
        }
        Decimal::from_f64_retain(raw).ok_or_else(|| Error::InvalidAmount {
            message: format!("hold amount {raw} is not representable"),
        })
    }
}

fn parse_positive_u64_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };

    let parsed = raw.parse::<u64>().map_err(|_| {
        Error::configuration(format!("{key} must be a positive integer, got '{raw}'"))
    })?;
    if parsed == 0 {
        return Err(Error::configuration(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(parsed)
}

fn parse_bool_env<F>(get_env: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::configuration(format!(
            "{key} must be a boolean, got '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = MarketConfig::default();
        assert_eq!(config.relay_interval, Duration::from_secs(2));
        assert_eq!(config.relay_batch_size, 50);
        assert_eq!(config.sweeper_interval, Duration::from_secs(30));
        assert_eq!(config.queued_stale_after, chrono::Duration::minutes(5));
        assert_eq!(config.quote_ttl, Duration::from_secs(45));
        assert_eq!(config.quote_cache_capacity, 1000);
        assert!(!config.refund_on_provision_failure);
    }

    #[test]
    fn env_overrides_apply() -> Result<()> {
        let config = MarketConfig::from_env_with(|key| match key {
            "MERIDIAN_RELAY_BATCH_SIZE" => Some("10".to_string()),
            "MERIDIAN_DEFAULT_REGION" => Some("eu-west-1".to_string()),
            "MERIDIAN_REFUND_ON_PROVISION_FAILURE" => Some("true".to_string()),
            _ => None,
        })?;
        assert_eq!(config.relay_batch_size, 10);
        assert_eq!(config.default_region, "eu-west-1");
        assert!(config.refund_on_provision_failure);
        Ok(())
    }

    #[test]
    fn malformed_values_are_rejected() {
        let result = MarketConfig::from_env_with(|key| {
            (key == "MERIDIAN_QUOTE_TTL_SECS").then(|| "soon".to_string())
        });
        assert!(result.is_err());

        let result = MarketConfig::from_env_with(|key| {
            (key == "MERIDIAN_RELAY_INTERVAL_SECS").then(|| "0".to_string())
        });
        assert!(result.is_err());

        let result = MarketConfig::from_env_with(|key| {
            (key == "MERIDIAN_REFUND_ON_PROVISION_FAILURE").then(|| "maybe".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn hold_amount_applies_safety_margin() -> Result<()> {
        let config = MarketConfig::default();
        let amount = config.hold_amount(0.50)?;
        // 0.50 * 1.2 = 0.60
        assert_eq!(amount.round_dp(2), Decimal::new(60, 2));
        Ok(())
    }

    #[test]
    fn hold_amount_rejects_garbage() {
        let config = MarketConfig::default();
        assert!(config.hold_amount(f64::NAN).is_err());
        assert!(config.hold_amount(-1.0).is_err());
    }
}
