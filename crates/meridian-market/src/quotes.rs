//! Provider quotes and the cached quote source.
//!
//! A [`Quote`] is a provider's current offer for a (region, resource type)
//! pair: hourly price, latency estimate, and reliability. Fetching quotes
//! from every registered provider is expensive, so [`QuoteService`] fronts a
//! [`QuoteFetcher`] with a process-local, thread-safe [`QuoteCache`]: entries
//! expire after a fixed TTL and the key set is bounded, evicting the oldest
//! key when full. Reads up to the TTL may be stale; that is accepted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default cache time-to-live.
pub const DEFAULT_QUOTE_TTL: Duration = Duration::from_secs(45);

/// Default bound on distinct cached (region, resource type) keys.
pub const DEFAULT_QUOTE_CACHE_CAPACITY: usize = 1000;

/// A provider's current offer for one resource class in one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Provider label; the registry key the orchestrator resolves.
    pub provider: String,
    /// Region the offer applies to.
    pub region: String,
    /// Resource type the offer applies to.
    pub resource_type: String,
    /// On-demand hourly price in USD.
    pub hourly_price: f64,
    /// Estimated latency in milliseconds.
    pub latency_ms: f64,
    /// Reliability score in `[0, 1]`.
    pub reliability: f64,
}

/// Fetches fresh quotes from the registered providers.
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    /// Returns current quotes for (region, resource type).
    async fn fetch(&self, region: &str, resource_type: &str) -> Result<Vec<Quote>>;
}

/// A fetcher serving a fixed quote table.
///
/// Stands in for live provider pricing feeds in development and tests.
#[derive(Debug)]
pub struct StaticQuoteFetcher {
    quotes: Vec<(String, f64, f64, f64)>,
}

impl Default for StaticQuoteFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticQuoteFetcher {
    /// Creates a fetcher with the stock development offers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            quotes: vec![
                ("fake".to_string(), 0.50, 800.0, 0.98),
                ("runpod".to_string(), 0.62, 650.0, 0.97),
            ],
        }
    }

    /// Creates a fetcher serving the given (provider, price, latency,
    /// reliability) rows.
    #[must_use]
    pub fn with_offers(quotes: Vec<(String, f64, f64, f64)>) -> Self {
        Self { quotes }
    }
}

#[async_trait]
impl QuoteFetcher for StaticQuoteFetcher {
    async fn fetch(&self, region: &str, resource_type: &str) -> Result<Vec<Quote>> {
        Ok(self
            .quotes
            .iter()
            .map(|(provider, price, latency, reliability)| Quote {
                provider: provider.clone(),
                region: region.to_string(),
                resource_type: resource_type.to_string(),
                hourly_price: *price,
                latency_ms: *latency,
                reliability: *reliability,
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
struct CachedQuotes {
    quotes: Vec<Quote>,
    fetched_at: DateTime<Utc>,
}

/// Bounded, time-limited cache of quote lists.
///
/// Keys are `(region, resource type)`. An entry is served until `ttl` has
/// elapsed since it was stored. When the number of distinct keys would
/// exceed `capacity`, the oldest-inserted key is evicted first.
///
/// Methods take `now` explicitly so expiry is testable without waiting.
#[derive(Debug)]
pub struct QuoteCache {
    ttl: chrono::Duration,
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CachedQuotes>,
    insertion_order: VecDeque<String>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("quote cache lock poisoned")
}

impl QuoteCache {
    /// Creates a cache with the given TTL and key capacity.
    ///
    /// # Panics
    ///
    /// Panics if `ttl` exceeds the representable chrono duration range,
    /// which cannot happen for any realistic TTL.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).expect("quote TTL out of range"),
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    fn cache_key(region: &str, resource_type: &str) -> String {
        format!("{region}|{resource_type}")
    }

    /// Returns the cached quotes for the key if present and not expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn get(
        &self,
        region: &str,
        resource_type: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<Quote>>> {
        let key = Self::cache_key(region, resource_type);
        let inner = self.inner.lock().map_err(poison_err)?;
        Ok(inner
            .entries
            .get(&key)
            .filter(|cached| now - cached.fetched_at < self.ttl)
            .map(|cached| cached.quotes.clone()))
    }

    /// Stores quotes for the key, evicting the oldest key when over
    /// capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert(
        &self,
        region: &str,
        resource_type: &str,
        quotes: Vec<Quote>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let key = Self::cache_key(region, resource_type);
        let mut inner = self.inner.lock().map_err(poison_err)?;

        if inner.entries.insert(key.clone(), CachedQuotes { quotes, fetched_at: now }).is_none() {
            inner.insertion_order.push_back(key);
            while inner.entries.len() > self.capacity {
                let Some(oldest) = inner.insertion_order.pop_front() else {
                    break;
                };
                inner.entries.remove(&oldest);
            }
        }
        Ok(())
    }

    /// Returns the number of distinct keys currently cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        let inner = self.inner.lock().map_err(poison_err)?;
        Ok(inner.entries.len())
    }

    /// Returns true if no keys are cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Quote source: a fetcher fronted by a shared cache.
///
/// Constructed once at process start and shared by reference across
/// concurrent submissions.
pub struct QuoteService {
    fetcher: Arc<dyn QuoteFetcher>,
    cache: QuoteCache,
}

impl QuoteService {
    /// Creates a quote service with the given fetcher and cache settings.
    #[must_use]
    pub fn new(fetcher: Arc<dyn QuoteFetcher>, ttl: Duration, capacity: usize) -> Self {
        Self {
            fetcher,
            cache: QuoteCache::new(ttl, capacity),
        }
    }

    /// Returns current quotes for (region, resource type), served from cache
    /// when fresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying fetch fails on a cache miss.
    #[tracing::instrument(skip(self))]
    pub async fn get_quotes(&self, region: &str, resource_type: &str) -> Result<Vec<Quote>> {
        let now = Utc::now();
        if let Some(quotes) = self.cache.get(region, resource_type, now)? {
            return Ok(quotes);
        }

        let quotes = self.fetcher.fetch(region, resource_type).await?;
        self.cache
            .insert(region, resource_type, quotes.clone(), now)?;
        tracing::debug!(region, resource_type, count = quotes.len(), "quotes refreshed");
        Ok(quotes)
    }
}
