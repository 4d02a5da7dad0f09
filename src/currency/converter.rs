//! Debounced, cached conversion of a running total into the other currency.
//!
//! State machine per active currency:
//!
//! ```text
//! Idle ──(amount/currency change, no valid rate)──> [debounce] ──> Fetching
//! Fetching ──ok──> Ready        Fetching ──err──> Failed
//! Ready/Failed ──(new input, no valid rate)──> [debounce] ──> Fetching
//! ```
//!
//! A valid cached rate converts synchronously with no debounce. Base currency
//! never converts.

use super::cache::{ExchangeRateEntry, RateCache};
use super::provider::RateProvider;
use super::{round2, CurrencyCode, CurrencyPair, RateKey};
use crate::config::LedgerConfig;
use crate::error::{Error, Result};
use crate::observability::{LedgerMetrics, NoOpMetrics};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Phase of the converter for the current inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionPhase {
    /// Nothing to convert (base currency or zero amount).
    Idle,
    /// A rate request is in flight.
    Fetching,
    /// `converted_amount` holds the result.
    Ready,
    /// The last request failed; `error` holds the message.
    Failed,
}

/// Observable converter state.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversionState {
    pub phase: ConversionPhase,
    pub active: CurrencyCode,
    pub target: CurrencyCode,
    pub amount: f64,
    pub converted_amount: Option<f64>,
    pub error: Option<String>,
    pub rate: Option<f64>,
    /// `1 EUR = 25.0000 CZK`, present only for a rate of the active pair.
    pub rate_text: Option<String>,
}

impl ConversionState {
    fn idle(pair: &CurrencyPair, active: CurrencyCode, amount: f64) -> Self {
        ConversionState {
            phase: ConversionPhase::Idle,
            target: pair.target_for(&active),
            active,
            amount,
            converted_amount: None,
            error: None,
            rate: None,
            rate_text: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == ConversionPhase::Fetching
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Inputs {
    amount: f64,
    active: CurrencyCode,
}

impl Inputs {
    fn has_amount(&self) -> bool {
        self.amount.is_finite() && self.amount != 0.0
    }
}

struct Inner<P> {
    provider: P,
    pair: CurrencyPair,
    cache: RateCache,
    debounce: Duration,
    state: watch::Sender<ConversionState>,
    inputs: Mutex<Option<Inputs>>,
    pending: Mutex<Option<JoinHandle<()>>>,
    fetch: Mutex<Option<JoinHandle<()>>>,
    in_flight: Mutex<Option<RateKey>>,
    metrics: Arc<dyn LedgerMetrics>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Converts an amount in the active currency into the other currency of the
/// pair, fetching rates through `P` at most once per debounce window.
///
/// Must be driven from inside a tokio runtime: `update` spawns the debounce
/// and fetch tasks.
///
/// # Example
///
/// ```no_run
/// use ledger_kit::currency::{CurrencyCode, CurrencyConverter, InMemoryRateProvider};
/// use ledger_kit::LedgerConfig;
///
/// # #[tokio::main]
/// # async fn main() {
/// let provider = InMemoryRateProvider::new()
///     .with_rate(CurrencyCode::eur(), CurrencyCode::czk(), 25.0);
/// let converter = CurrencyConverter::new(provider, &LedgerConfig::default());
///
/// converter.update(12.0, CurrencyCode::eur());
/// let mut rx = converter.watch();
/// let state = rx.wait_for(|s| !s.is_loading() && s.converted_amount.is_some()).await.unwrap();
/// assert_eq!(state.converted_amount, Some(300.0));
/// # }
/// ```
pub struct CurrencyConverter<P: RateProvider> {
    inner: Arc<Inner<P>>,
}

impl<P: RateProvider> CurrencyConverter<P> {
    pub fn new(provider: P, config: &LedgerConfig) -> Self {
        Self::with_metrics(provider, config, Arc::new(NoOpMetrics))
    }

    pub fn with_metrics(provider: P, config: &LedgerConfig, metrics: Arc<dyn LedgerMetrics>) -> Self {
        let pair = config.currencies.clone();
        let initial = ConversionState::idle(&pair, pair.base().clone(), 0.0);
        CurrencyConverter {
            inner: Arc::new(Inner {
                provider,
                cache: RateCache::new(config.rate_ttl.clone()),
                debounce: config.debounce,
                state: watch::channel(initial).0,
                inputs: Mutex::new(None),
                pending: Mutex::new(None),
                fetch: Mutex::new(None),
                in_flight: Mutex::new(None),
                metrics,
                pair,
            }),
        }
    }

    /// Feed new inputs.
    ///
    /// Identical inputs are ignored while a debounce or fetch for them is
    /// pending, while their rate is still cached, or after they failed (no
    /// automatic retry; use [`refresh`](Self::refresh)).
    pub fn update(&self, amount: f64, active: CurrencyCode) {
        let inputs = Inputs { amount, active };
        let unchanged = {
            let mut current = lock(&self.inner.inputs);
            let unchanged = current.as_ref() == Some(&inputs);
            *current = Some(inputs.clone());
            unchanged
        };

        if unchanged && self.inner.is_settled(&inputs) {
            return;
        }
        self.inner.evaluate(&inputs);
    }

    /// Re-evaluate the last inputs, fetching again if the cached rate is
    /// missing or stale.
    pub fn refresh(&self) {
        let inputs = lock(&self.inner.inputs).clone();
        if let Some(inputs) = inputs {
            self.inner.evaluate(&inputs);
        }
    }

    pub fn state(&self) -> ConversionState {
        self.inner.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ConversionState> {
        self.inner.state.subscribe()
    }

    pub fn converted_amount(&self) -> Option<f64> {
        self.inner.state.borrow().converted_amount
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    pub fn pair(&self) -> &CurrencyPair {
        &self.inner.pair
    }

    /// Cached rate for `from -> to`, if still within its TTL.
    pub fn cached_rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Option<f64> {
        let key = RateKey::new(from.clone(), to.clone());
        self.inner.cache.get_valid(&key).map(|entry| entry.rate)
    }

    /// Cancel a pending debounce. In-flight fetches still complete and cache
    /// their rate.
    pub fn cancel(&self) {
        self.inner.cancel_pending();
    }
}

impl<P: RateProvider> Drop for CurrencyConverter<P> {
    fn drop(&mut self) {
        self.inner.cancel_pending();
        if let Some(handle) = lock(&self.inner.fetch).take() {
            handle.abort();
        }
    }
}

impl<P: RateProvider> Inner<P> {
    fn key_for(&self, active: &CurrencyCode) -> RateKey {
        RateKey::new(active.clone(), self.pair.target_for(active))
    }

    fn is_settled(&self, inputs: &Inputs) -> bool {
        let key = self.key_for(&inputs.active);
        let debouncing = lock(&self.pending)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        let fetching = lock(&self.in_flight).as_ref() == Some(&key);
        let failed = self.state.borrow().phase == ConversionPhase::Failed;
        debouncing || fetching || failed || self.cache.get_valid(&key).is_some()
    }

    fn cancel_pending(&self) {
        if let Some(handle) = lock(&self.pending).take() {
            handle.abort();
        }
    }

    fn publish(&self, next: ConversionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// State for `inputs` given a rate entry of their pair.
    fn resolved(&self, inputs: &Inputs, entry: &ExchangeRateEntry) -> ConversionState {
        let mut state = ConversionState::idle(&self.pair, inputs.active.clone(), inputs.amount);
        state.rate = Some(entry.rate);
        state.rate_text = Some(entry.annotation());
        if inputs.has_amount() {
            state.phase = ConversionPhase::Ready;
            state.converted_amount = Some(round2(inputs.amount * entry.rate));
        }
        state
    }

    fn evaluate(self: &Arc<Self>, inputs: &Inputs) {
        self.cancel_pending();

        if self.pair.is_base(&inputs.active) {
            self.publish(ConversionState::idle(&self.pair, inputs.active.clone(), inputs.amount));
            return;
        }

        let key = self.key_for(&inputs.active);
        if !inputs.has_amount() {
            let mut state = ConversionState::idle(&self.pair, inputs.active.clone(), inputs.amount);
            if let Some(entry) = self.cache.get(&key) {
                state.rate = Some(entry.rate);
                state.rate_text = Some(entry.annotation());
            }
            self.publish(state);
            return;
        }

        if let Some(entry) = self.cache.get_valid(&key) {
            self.metrics.record_rate_hit(&key.to_string());
            self.publish(self.resolved(inputs, &entry));
            return;
        }

        self.metrics.record_rate_miss(&key.to_string());
        let inner = Arc::clone(self);
        let debounce = self.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            inner.fire();
        });
        *lock(&self.pending) = Some(handle);
    }

    /// Debounce elapsed: convert from cache or start one fetch.
    fn fire(self: &Arc<Self>) {
        let Some(inputs) = lock(&self.inputs).clone() else {
            return;
        };
        if self.pair.is_base(&inputs.active) || !inputs.has_amount() {
            return;
        }

        let key = self.key_for(&inputs.active);
        if let Some(entry) = self.cache.get_valid(&key) {
            self.metrics.record_rate_hit(&key.to_string());
            self.publish(self.resolved(&inputs, &entry));
            return;
        }

        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.as_ref() == Some(&key) {
                debug!("Rate fetch for {} already in flight, skipping", key);
                return;
            }
            *in_flight = Some(key.clone());
        }

        let previous = self.state.borrow().clone();
        let same_pair = previous.active == inputs.active;
        self.publish(ConversionState {
            phase: ConversionPhase::Fetching,
            target: key.to.clone(),
            active: inputs.active.clone(),
            amount: inputs.amount,
            converted_amount: previous.converted_amount.filter(|_| same_pair),
            error: None,
            rate: previous.rate.filter(|_| same_pair),
            rate_text: previous.rate_text.filter(|_| same_pair),
        });

        debug!("Fetching rate {}", key);
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let result = inner.provider.fetch_rate(&key.from, &key.to).await;
            inner.complete(key, result, started.elapsed());
        });
        *lock(&self.fetch) = Some(handle);
    }

    /// Fetch finished. The rate is cached under its own pair; state is only
    /// published when that pair is still the active one.
    fn complete(&self, key: RateKey, result: Result<f64>, elapsed: Duration) {
        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.as_ref() == Some(&key) {
                *in_flight = None;
            }
        }

        let current = lock(&self.inputs)
            .clone()
            .filter(|inputs| self.key_for(&inputs.active) == key);

        match result {
            Ok(rate) => {
                self.metrics.record_rate_fetch(&key.to_string(), elapsed);
                let entry = self.cache.insert(key.clone(), rate);
                match current {
                    Some(inputs) => self.publish(self.resolved(&inputs, &entry)),
                    None => debug!("Cached rate {} for an inactive pair", key),
                }
            }
            Err(err) => {
                let message = match err {
                    Error::ConversionError(message) => message,
                    other => {
                        debug!("Rate fetch {} failed: {}", key, other);
                        "Could not convert currency".to_string()
                    }
                };
                warn!("⚠ Conversion {} failed: {}", key, message);
                self.metrics.record_error(&key.to_string(), &message);

                let Some(inputs) = current else {
                    return;
                };
                let stale = self.cache.get(&key);
                self.publish(ConversionState {
                    phase: ConversionPhase::Failed,
                    target: key.to.clone(),
                    active: inputs.active,
                    amount: inputs.amount,
                    converted_amount: None,
                    error: Some(message),
                    rate: stale.as_ref().map(|entry| entry.rate),
                    rate_text: stale.as_ref().map(ExchangeRateEntry::annotation),
                });
            }
        }
    }
}
