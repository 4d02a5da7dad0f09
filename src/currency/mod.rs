//! Currency codes, the two-currency toggle, and rate conversion.
//!
//! - `CurrencyCode` / `CurrencyPair`: validated ISO-style codes and the toggle
//! - `RateCache`: TTL-bounded exchange-rate entries keyed by direction
//! - `RateProvider`: where rates come from (`HttpRateProvider`, `InMemoryRateProvider`)
//! - `CurrencyConverter`: debounced conversion state machine on top of both

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod cache;
pub mod converter;
#[cfg(feature = "http")]
pub mod http;
pub mod provider;

pub use cache::{ExchangeRateEntry, RateCache};
pub use converter::{ConversionPhase, ConversionState, CurrencyConverter};
#[cfg(feature = "http")]
pub use http::HttpRateProvider;
pub use provider::{InMemoryRateProvider, RateProvider};

/// Three-letter currency code, always upper case.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse a code. Accepts any case, stores upper case.
    ///
    /// # Errors
    /// Returns `Error::ValidationError` unless `code` is exactly three ASCII letters.
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::ValidationError(format!(
                "invalid currency code: {:?}",
                code
            )));
        }
        Ok(CurrencyCode(code.to_ascii_uppercase()))
    }

    pub fn czk() -> Self {
        CurrencyCode("CZK".to_string())
    }

    pub fn eur() -> Self {
        CurrencyCode("EUR".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CurrencyCode::new(s)
    }
}

/// The two currencies an order rotates between.
///
/// Totals are kept in whatever currency each item was added with; conversion
/// always goes from the active currency to the other member of the pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrencyPair {
    base: CurrencyCode,
    secondary: CurrencyCode,
}

impl CurrencyPair {
    pub fn new(base: CurrencyCode, secondary: CurrencyCode) -> Self {
        CurrencyPair { base, secondary }
    }

    pub fn base(&self) -> &CurrencyCode {
        &self.base
    }

    pub fn secondary(&self) -> &CurrencyCode {
        &self.secondary
    }

    pub fn is_base(&self, code: &CurrencyCode) -> bool {
        *code == self.base
    }

    pub fn contains(&self, code: &CurrencyCode) -> bool {
        *code == self.base || *code == self.secondary
    }

    /// Currency that `active` converts into.
    pub fn target_for(&self, active: &CurrencyCode) -> CurrencyCode {
        if *active == self.base {
            self.secondary.clone()
        } else {
            self.base.clone()
        }
    }

    /// The other currency of the toggle.
    pub fn toggle(&self, active: &CurrencyCode) -> CurrencyCode {
        self.target_for(active)
    }
}

/// Direction of an exchange-rate lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
}

impl RateKey {
    pub fn new(from: CurrencyCode, to: CurrencyCode) -> Self {
        RateKey { from, to }
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

/// Round a money amount to two decimals.
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
