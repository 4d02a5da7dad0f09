//! High-level bill service.
//!
//! Wires the ledger, the archive and the converter to one auth context and
//! one active-currency setting.

use crate::archive::{ArchiveReceipt, ArchiveService};
use crate::auth::AuthContext;
use crate::config::LedgerConfig;
use crate::currency::{ConversionState, CurrencyCode, CurrencyConverter, CurrencyPair, RateProvider};
use crate::error::{Error, Result};
use crate::ledger::{LineItem, OrderLedger, OrderSummary};
use crate::observability::{LedgerMetrics, NoOpMetrics};
use crate::store::RemoteStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Shared<S: RemoteStore, P: RateProvider> {
    ledger: Arc<OrderLedger<S>>,
    archive: ArchiveService<S>,
    converter: Arc<CurrencyConverter<P>>,
    currency: watch::Sender<CurrencyCode>,
    pair: CurrencyPair,
    bridge: JoinHandle<()>,
}

impl<S: RemoteStore, P: RateProvider> Drop for Shared<S, P> {
    fn drop(&mut self) {
        self.bridge.abort();
    }
}

/// Shared bill: ledger, archive and conversion of the running total.
///
/// Cloning is cheap; clones share everything. The conversion follows the
/// total of the active currency: every ledger snapshot and every currency
/// switch feeds the converter.
///
/// # Example
///
/// ```no_run
/// use ledger_kit::{AuthContext, BillService, LedgerConfig};
/// use ledger_kit::currency::{CurrencyCode, HttpRateProvider};
/// use ledger_kit::store::InMemoryStore;
///
/// # #[tokio::main]
/// # async fn main() -> ledger_kit::Result<()> {
/// let config = LedgerConfig::default();
/// let bill = BillService::new(
///     InMemoryStore::new(),
///     HttpRateProvider::from_config(&config)?,
///     AuthContext::signed_in("alice@example.com"),
///     &config,
/// );
///
/// bill.add_item("Coffee", 50.0).await?;
/// bill.set_currency(CurrencyCode::eur()).await?;
/// # Ok(())
/// # }
/// ```
pub struct BillService<S: RemoteStore, P: RateProvider> {
    shared: Arc<Shared<S, P>>,
}

impl<S: RemoteStore, P: RateProvider> Clone for BillService<S, P> {
    fn clone(&self) -> Self {
        BillService {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: RemoteStore, P: RateProvider> BillService<S, P> {
    /// Must be called inside a tokio runtime.
    pub fn new(store: S, provider: P, auth: AuthContext, config: &LedgerConfig) -> Self {
        Self::with_metrics(store, provider, auth, config, Arc::new(NoOpMetrics))
    }

    pub fn with_metrics(
        store: S,
        provider: P,
        auth: AuthContext,
        config: &LedgerConfig,
        metrics: Arc<dyn LedgerMetrics>,
    ) -> Self {
        let ledger = Arc::new(OrderLedger::with_metrics(
            store.clone(),
            auth.clone(),
            config,
            Arc::clone(&metrics),
        ));
        Self::from_parts(store, provider, auth, ledger, config, metrics)
    }

    /// Build around an existing ledger (e.g. one with a custom clock).
    pub fn from_parts(
        store: S,
        provider: P,
        auth: AuthContext,
        ledger: Arc<OrderLedger<S>>,
        config: &LedgerConfig,
        metrics: Arc<dyn LedgerMetrics>,
    ) -> Self {
        let archive = ArchiveService::with_metrics(store, auth, Arc::clone(&ledger), config, Arc::clone(&metrics));
        let converter = Arc::new(CurrencyConverter::with_metrics(provider, config, metrics));
        let pair = config.currencies.clone();
        let (currency, currency_rx) = watch::channel(pair.base().clone());

        let bridge = tokio::spawn(feed_converter(Arc::clone(&ledger), Arc::clone(&converter), currency_rx));

        BillService {
            shared: Arc::new(Shared {
                ledger,
                archive,
                converter,
                currency,
                pair,
                bridge,
            }),
        }
    }

    pub fn ledger(&self) -> &OrderLedger<S> {
        &self.shared.ledger
    }

    pub fn archive(&self) -> &ArchiveService<S> {
        &self.shared.archive
    }

    pub fn converter(&self) -> &CurrencyConverter<P> {
        &self.shared.converter
    }

    pub fn currency(&self) -> CurrencyCode {
        self.shared.currency.borrow().clone()
    }

    /// Switch the active currency. Must be one of the configured pair.
    ///
    /// Every item of the ledger is moved to `currency` in one write before the
    /// view switches; if that write fails the active currency is unchanged.
    pub async fn set_currency(&self, currency: CurrencyCode) -> Result<()> {
        if !self.shared.pair.contains(&currency) {
            return Err(Error::ValidationError(format!(
                "{} is not one of {} / {}",
                currency,
                self.shared.pair.base(),
                self.shared.pair.secondary()
            )));
        }
        self.shared.ledger.set_currency(&currency).await?;
        self.shared.currency.send_if_modified(|active| {
            if *active == currency {
                return false;
            }
            info!("Active currency {} -> {}", active, currency);
            *active = currency;
            true
        });
        Ok(())
    }

    /// Flip between the two currencies of the pair.
    pub async fn toggle_currency(&self) -> Result<CurrencyCode> {
        let next = self.shared.pair.toggle(&self.currency());
        self.set_currency(next.clone()).await?;
        Ok(next)
    }

    pub fn summary(&self) -> OrderSummary {
        self.shared.ledger.summary()
    }

    pub fn conversion(&self) -> ConversionState {
        self.shared.converter.state()
    }

    /// Add an item priced in the active currency.
    pub async fn add_item(&self, name: &str, unit_price: f64) -> Result<Option<LineItem>> {
        self.shared.ledger.add_item(name, unit_price, self.currency()).await
    }

    pub async fn archive_current_order(&self) -> Result<Option<ArchiveReceipt>> {
        self.shared.archive.archive_current_order().await
    }
}

/// Push the active-currency total into the converter whenever the ledger or
/// the currency changes.
async fn feed_converter<S: RemoteStore, P: RateProvider>(
    ledger: Arc<OrderLedger<S>>,
    converter: Arc<CurrencyConverter<P>>,
    mut currency_rx: watch::Receiver<CurrencyCode>,
) {
    let mut items_rx = ledger.watch();
    loop {
        let active = currency_rx.borrow_and_update().clone();
        drop(items_rx.borrow_and_update());
        let total = ledger.summary().total_for(&active);
        converter.update(total, active);

        tokio::select! {
            changed = items_rx.changed() => if changed.is_err() { return },
            changed = currency_rx.changed() => if changed.is_err() { return },
        }
    }
}
