//! Provider selection over a set of quotes.
//!
//! Selection is a pure function: no I/O, no clock, deterministic for a given
//! input. The orchestrator fetches quotes, asks the policy for exactly one,
//! and provisions against the winner.

use crate::error::{Error, Result};
use crate::quotes::Quote;

/// Chooses one quote from a non-empty set.
pub trait SelectionPolicy: Send + Sync {
    /// Picks the winning quote.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyQuoteSet`] when given no quotes; the caller
    /// must treat this as a hard submission failure.
    fn pick<'a>(&self, quotes: &'a [Quote]) -> Result<&'a Quote>;
}

/// Weighted-cost selection balancing price, latency, and reliability.
///
/// Lower scores win:
///
/// ```text
/// score = 0.5 * price + 0.25 * (latency_ms / 100) + 0.2 * (1 - reliability)
/// ```
///
/// Ties break in input order: the first minimal element is chosen.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalancedPolicy;

const PRICE_WEIGHT: f64 = 0.5;
const LATENCY_WEIGHT: f64 = 0.25;
const RELIABILITY_WEIGHT: f64 = 0.2;

impl BalancedPolicy {
    /// Scores a single quote; lower is better.
    #[must_use]
    pub fn score(quote: &Quote) -> f64 {
        PRICE_WEIGHT * quote.hourly_price
            + LATENCY_WEIGHT * quote.latency_ms / 100.0
            + RELIABILITY_WEIGHT * (1.0 - quote.reliability)
    }
}

impl SelectionPolicy for BalancedPolicy {
    fn pick<'a>(&self, quotes: &'a [Quote]) -> Result<&'a Quote> {
        let mut best: Option<(&Quote, f64)> = None;
        for quote in quotes {
            let score = Self::score(quote);
            match best {
                Some((_, best_score)) if score >= best_score => {}
                _ => best = Some((quote, score)),
            }
        }

        best.map(|(quote, _)| quote).ok_or_else(|| Error::EmptyQuoteSet {
            region: String::new(),
            resource_type: String::new(),
        })
    }
}
