//! Exchange-rate sources.

use super::CurrencyCode;
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source of exchange rates.
///
/// One call is one request to the rate service. Failures are returned as
/// `Error::ConversionError` with a message fit for display.
pub trait RateProvider: Send + Sync + 'static {
    /// Rate such that `amount_in_from * rate = amount_in_to`.
    fn fetch_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> impl Future<Output = Result<f64>> + Send;
}

/// Provider serving rates from memory, with call counting and failure
/// injection. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryRateProvider {
    rates: Arc<DashMap<(CurrencyCode, CurrencyCode), f64>>,
    failure: Arc<Mutex<Option<String>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryRateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `rate` for `from -> to`.
    pub fn with_rate(self, from: CurrencyCode, to: CurrencyCode, rate: f64) -> Self {
        self.set_rate(from, to, rate);
        self
    }

    pub fn set_rate(&self, from: CurrencyCode, to: CurrencyCode, rate: f64) {
        self.rates.insert((from, to), rate);
    }

    /// Fail every call with `message` until cleared with `None`.
    pub fn fail_with(&self, message: Option<&str>) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = message.map(str::to_string);
    }

    /// Delay every response by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Number of fetches served so far (including failed ones).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RateProvider for InMemoryRateProvider {
    async fn fetch_rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(message) = failure {
            return Err(Error::ConversionError(message));
        }

        self.rates
            .get(&(from.clone(), to.clone()))
            .map(|rate| *rate)
            .ok_or_else(|| Error::ConversionError(format!("Rate for {} not available", to)))
    }
}
