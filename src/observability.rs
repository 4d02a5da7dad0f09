//! Observability hooks and rate TTL policies.
//!
//! Ledger-kit separates observability into two concerns:
//!
//! - **Metrics (`LedgerMetrics`)**: snapshots published or skipped, store
//!   writes, exchange-rate cache hits, misses and fetches, errors
//! - **TTL Policies (`TtlPolicy`)**: how long a fetched exchange rate stays
//!   reusable
//!
//! # Metrics
//!
//! Implement `LedgerMetrics` to forward events to your monitoring system:
//!
//! ```ignore
//! use ledger_kit::observability::LedgerMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl LedgerMetrics for PrometheusMetrics {
//!     fn record_rate_fetch(&self, _pair: &str, _duration: Duration) {
//!         // histogram!("fx_fetch_latency").record(duration);
//!     }
//!     // ... other methods keep their logging defaults
//! }
//! ```
//!
//! The default methods log via the `log` crate. `NoOpMetrics` discards
//! everything and is what components use unless told otherwise.
//!
//! # TTL Policies
//!
//! ```
//! use ledger_kit::observability::TtlPolicy;
//! use std::time::Duration;
//!
//! // Same lifetime for every pair (the default is 10 minutes)
//! let _policy = TtlPolicy::Fixed(Duration::from_secs(600));
//!
//! // Different lifetime per pair key ("EUR->CZK")
//! let _policy = TtlPolicy::PerPair(|pair| match pair {
//!     "EUR->CZK" => Duration::from_secs(600),
//!     _ => Duration::from_secs(60),
//! });
//! ```

use std::time::Duration;

/// Default lifetime of a fetched exchange rate.
pub const DEFAULT_RATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Trait for ledger metrics collection.
pub trait LedgerMetrics: Send + Sync {
    /// Record a snapshot that was published to dependents (`published`) or
    /// skipped because it equalled the previous one.
    fn record_snapshot(&self, path: &str, published: bool) {
        if published {
            debug!("Snapshot PUBLISHED: {}", path);
        } else {
            debug!("Snapshot SKIPPED (unchanged): {}", path);
        }
    }

    /// Record an acknowledged store write.
    fn record_write(&self, path: &str, duration: Duration) {
        debug!("Store WRITE: {} took {:?}", path, duration);
    }

    /// Record a conversion served from a cached rate.
    fn record_rate_hit(&self, pair: &str) {
        debug!("Rate HIT: {}", pair);
    }

    /// Record a conversion that needs a fetch.
    fn record_rate_miss(&self, pair: &str) {
        debug!("Rate MISS: {}", pair);
    }

    /// Record a completed rate fetch.
    fn record_rate_fetch(&self, pair: &str, duration: Duration) {
        debug!("Rate FETCH: {} took {:?}", pair, duration);
    }

    /// Record an error.
    fn record_error(&self, key: &str, error: &str) {
        warn!("ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl LedgerMetrics for NoOpMetrics {
    fn record_snapshot(&self, _path: &str, _published: bool) {}
    fn record_write(&self, _path: &str, _duration: Duration) {}
    fn record_rate_hit(&self, _pair: &str) {}
    fn record_rate_miss(&self, _pair: &str) {}
    fn record_rate_fetch(&self, _pair: &str, _duration: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Metrics implementation that only logs (uses the trait defaults).
#[derive(Clone, Default)]
pub struct LogMetrics;

impl LedgerMetrics for LogMetrics {}

/// TTL (Time-to-Live) policy for exchange-rate entries.
#[derive(Clone, Debug)]
pub enum TtlPolicy {
    /// Fixed duration for all pairs
    Fixed(Duration),

    /// Rates never expire within a session
    Infinite,

    /// Custom per-pair policy, keyed by `"{FROM}->{TO}"`
    PerPair(fn(&str) -> Duration),
}

impl Default for TtlPolicy {
    fn default() -> Self {
        TtlPolicy::Fixed(DEFAULT_RATE_TTL)
    }
}

impl TtlPolicy {
    /// Get TTL for a pair key. `None` means no expiry.
    pub fn get_ttl(&self, pair: &str) -> Option<Duration> {
        match self {
            TtlPolicy::Fixed(d) => Some(*d),
            TtlPolicy::Infinite => None,
            TtlPolicy::PerPair(f) => Some(f(pair)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_metrics() {
        let metrics = NoOpMetrics;
        metrics.record_rate_hit("EUR->CZK");
        metrics.record_write("orderItems/a", Duration::from_millis(2));
    }

    #[test]
    fn test_ttl_policy_default_is_ten_minutes() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.get_ttl("EUR->CZK"), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_ttl_policy_infinite() {
        assert_eq!(TtlPolicy::Infinite.get_ttl("any"), None);
    }

    #[test]
    fn test_ttl_policy_per_pair() {
        let policy = TtlPolicy::PerPair(|pair| match pair {
            "EUR->CZK" => Duration::from_secs(3600),
            _ => Duration::from_secs(60),
        });

        assert_eq!(policy.get_ttl("EUR->CZK"), Some(Duration::from_secs(3600)));
        assert_eq!(policy.get_ttl("CZK->EUR"), Some(Duration::from_secs(60)));
    }
}
