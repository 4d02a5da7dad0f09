//! HTTP exchange-rate provider (`GET {base}/latest?from=&to=`).

use super::provider::RateProvider;
use super::CurrencyCode;
use crate::config::LedgerConfig;
use crate::error::{Error, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Rate provider backed by a Frankfurter-compatible HTTP service.
///
/// Every failure mode maps to a displayable `Error::ConversionError`:
///
/// | Outcome | Message |
/// |---|---|
/// | non-2xx | `Currency conversion unavailable ({status})` |
/// | body is not JSON | `Invalid response from currency service` |
/// | no usable `rates[to]` | `Rate for {to} not available` |
/// | transport failure / timeout | `Could not convert currency` |
#[derive(Debug, Clone)]
pub struct HttpRateProvider {
    client: Client,
    base_url: String,
}

impl HttpRateProvider {
    /// # Errors
    /// Returns `Error::ConfigError` if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ConfigError(format!("HTTP client: {}", e)))?;
        Ok(HttpRateProvider {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Provider for `config.rate_endpoint` with `config.http_timeout`.
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        Self::new(&config.rate_endpoint, config.http_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl RateProvider for HttpRateProvider {
    async fn fetch_rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<f64> {
        let url = format!("{}/latest", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("from", from.as_str()), ("to", to.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("⚠ Rate service returned {} for {}->{}", status, from, to);
            return Err(Error::ConversionError(format!(
                "Currency conversion unavailable ({})",
                status.as_u16()
            )));
        }

        let body = response.text().await?;
        let data: Value = serde_json::from_str(&body).map_err(|e| {
            warn!("⚠ Rate service sent malformed body: {}", e);
            Error::ConversionError("Invalid response from currency service".to_string())
        })?;

        let rate = data
            .get("rates")
            .and_then(|rates| rates.get(to.as_str()))
            .and_then(Value::as_f64)
            .filter(|rate| rate.is_finite() && *rate > 0.0);

        match rate {
            Some(rate) => {
                debug!("✓ Rate {}->{} = {}", from, to, rate);
                Ok(rate)
            }
            None => {
                warn!("⚠ Rate service response lacks {}: {}", to, data);
                Err(Error::ConversionError(format!("Rate for {} not available", to)))
            }
        }
    }
}
