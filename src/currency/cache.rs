//! TTL-bounded exchange-rate cache.
//!
//! Entries are keyed by direction; a rate fetched for EUR->CZK is never used
//! for CZK->EUR. Expiry uses `tokio::time::Instant` so paused-clock tests can
//! step across the TTL.

use super::RateKey;
use crate::observability::TtlPolicy;
use dashmap::DashMap;
use tokio::time::Instant;

/// One fetched rate.
#[derive(Clone, Debug, PartialEq)]
pub struct ExchangeRateEntry {
    pub key: RateKey,
    pub rate: f64,
    pub fetched_at: Instant,
}

impl ExchangeRateEntry {
    pub fn new(key: RateKey, rate: f64) -> Self {
        ExchangeRateEntry {
            key,
            rate,
            fetched_at: Instant::now(),
        }
    }

    /// Reusable for `key` under `ttl` at this instant.
    pub fn is_valid_for(&self, key: &RateKey, ttl: &TtlPolicy) -> bool {
        if self.key != *key {
            return false;
        }
        match ttl.get_ttl(&key.to_string()) {
            Some(ttl) => self.fetched_at.elapsed() < ttl,
            None => true,
        }
    }

    /// Human readable rate, e.g. `1 EUR = 25.0000 CZK`.
    pub fn annotation(&self) -> String {
        format!("1 {} = {:.4} {}", self.key.from, self.rate, self.key.to)
    }
}

/// Rate cache owned by one converter.
pub struct RateCache {
    entries: DashMap<RateKey, ExchangeRateEntry>,
    ttl: TtlPolicy,
}

impl RateCache {
    pub fn new(ttl: TtlPolicy) -> Self {
        RateCache {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Entry for `key` if it is still within its TTL.
    pub fn get_valid(&self, key: &RateKey) -> Option<ExchangeRateEntry> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_valid_for(key, &self.ttl))
            .map(|entry| entry.clone())
    }

    /// Entry for `key` regardless of age.
    pub fn get(&self, key: &RateKey) -> Option<ExchangeRateEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    /// Store a freshly fetched rate, replacing any previous one for the pair.
    pub fn insert(&self, key: RateKey, rate: f64) -> ExchangeRateEntry {
        let entry = ExchangeRateEntry::new(key.clone(), rate);
        self.entries.insert(key, entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
