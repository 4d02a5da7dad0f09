//! Ledger configuration.

use crate::currency::{CurrencyCode, CurrencyPair};
use crate::observability::TtlPolicy;
use std::time::Duration;

/// Default collection holding live line items.
pub const ITEMS_PATH: &str = "orderItems";
/// Default collection holding archived orders.
pub const ARCHIVE_PATH: &str = "archive";
/// Default exchange-rate service.
pub const RATE_ENDPOINT: &str = "https://api.frankfurter.app";

/// Configuration shared by the ledger, archive and converter.
///
/// # Example
///
/// ```ignore
/// use ledger_kit::LedgerConfig;
/// use std::time::Duration;
///
/// let config = LedgerConfig::default()
///     .with_items_path("cafe/orderItems")
///     .with_debounce(Duration::from_millis(150));
/// ```
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Store collection of live line items.
    pub items_path: String,

    /// Store collection of archived orders.
    pub archive_path: String,

    /// The two currencies in rotation. Conversion runs only while the
    /// secondary one is active.
    pub currencies: CurrencyPair,

    /// Base URL of the exchange-rate service (`{endpoint}/latest?from=&to=`).
    pub rate_endpoint: String,

    /// How long a fetched rate stays reusable.
    pub rate_ttl: TtlPolicy,

    /// Quiet period before a conversion fetch fires.
    pub debounce: Duration,

    /// Timeout for one exchange-rate request.
    pub http_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            items_path: ITEMS_PATH.to_string(),
            archive_path: ARCHIVE_PATH.to_string(),
            currencies: CurrencyPair::new(CurrencyCode::czk(), CurrencyCode::eur()),
            rate_endpoint: RATE_ENDPOINT.to_string(),
            rate_ttl: TtlPolicy::default(),
            debounce: Duration::from_millis(300),
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl LedgerConfig {
    pub fn with_items_path(mut self, path: impl Into<String>) -> Self {
        self.items_path = path.into();
        self
    }

    pub fn with_archive_path(mut self, path: impl Into<String>) -> Self {
        self.archive_path = path.into();
        self
    }

    pub fn with_currencies(mut self, currencies: CurrencyPair) -> Self {
        self.currencies = currencies;
        self
    }

    pub fn with_rate_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.rate_endpoint = endpoint.into();
        self
    }

    pub fn with_rate_ttl(mut self, policy: TtlPolicy) -> Self {
        self.rate_ttl = policy;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}
