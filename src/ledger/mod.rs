//! The active order: line-item commands, optimistic patch, derived summary.
//!
//! Commands compute the new item locally from the freshest view (the pending
//! patch when it targets the same item, otherwise the last snapshot), record
//! it as the pending patch, and write only the touched fields. Every incoming
//! snapshot is checked against the patch: it is dropped once the snapshot
//! carries the written values, or once the write was acknowledged and any
//! later snapshot arrived. A snapshot copy stamped after the patch always
//! wins as the base of the next command.
//!
//! All items share one currency and one location. New items inherit both from
//! the first item; changing either rewrites every item in one write.

pub mod model;
pub mod patch;
pub mod summary;

pub use model::LineItem;
pub use patch::PendingPatch;
pub use summary::OrderSummary;

use crate::auth::AuthContext;
use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::currency::CurrencyCode;
use crate::error::{Error, Result};
use crate::observability::{LedgerMetrics, NoOpMetrics};
use crate::record::SyncRecord;
use crate::store::RemoteStore;
use crate::sync::{CollectionState, CollectionSync, SyncOptions};
use model::fields;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

const QUANTITY_FIELDS: &[&str] = &[fields::QUANTITY, fields::PRICE, fields::DATE, fields::TIME];
const PRICE_FIELDS: &[&str] = &[fields::UNIT_PRICE, fields::PRICE, fields::DATE, fields::TIME];
const NAME_FIELDS: &[&str] = &[fields::NAME, fields::DATE, fields::TIME];
const ITEM_FIELDS: &[&str] = &[
    fields::NAME,
    fields::UNIT_PRICE,
    fields::QUANTITY,
    fields::PRICE,
    fields::CURRENCY,
    fields::DATE,
    fields::TIME,
    fields::LOCATION,
    fields::USER,
];

type SharedPatch = Arc<Mutex<Option<PendingPatch>>>;

fn lock(pending: &Mutex<Option<PendingPatch>>) -> MutexGuard<'_, Option<PendingPatch>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

/// Drop the patch if the snapshot at `version` settles it; return what is left.
fn settle(pending: &Mutex<Option<PendingPatch>>, items: &[LineItem], version: u64) -> Option<PendingPatch> {
    let mut pending = lock(pending);
    if pending.as_ref().is_some_and(|patch| patch.is_settled_by(items, version)) {
        debug!("Pending patch settled at version {}", version);
        *pending = None;
    }
    pending.clone()
}

/// Settle the patch against every published snapshot. Ends with the sync.
async fn reconcile_snapshots(mut rx: watch::Receiver<CollectionState<LineItem>>, pending: SharedPatch) {
    while rx.changed().await.is_ok() {
        let (items, version) = {
            let state = rx.borrow_and_update();
            (state.items.clone(), state.version)
        };
        settle(&pending, &items, version);
    }
}

/// Shared, live order ledger.
pub struct OrderLedger<S: RemoteStore> {
    sync: CollectionSync<LineItem, S>,
    clock: Arc<dyn Clock>,
    pending: SharedPatch,
}

impl<S: RemoteStore> OrderLedger<S> {
    /// Start mirroring `config.items_path`. Must be called inside a tokio runtime.
    pub fn new(store: S, auth: AuthContext, config: &LedgerConfig) -> Self {
        Self::with_metrics(store, auth, config, Arc::new(NoOpMetrics))
    }

    pub fn with_metrics(
        store: S,
        auth: AuthContext,
        config: &LedgerConfig,
        metrics: Arc<dyn LedgerMetrics>,
    ) -> Self {
        let options = SyncOptions::new(config.items_path.clone());
        let sync = CollectionSync::start_with_metrics(store, auth, options, metrics);
        let pending = SharedPatch::default();
        tokio::spawn(reconcile_snapshots(sync.watch(), Arc::clone(&pending)));
        OrderLedger {
            sync,
            clock: Arc::new(SystemClock),
            pending,
        }
    }

    /// Replace the clock used to stamp items.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn items(&self) -> Vec<LineItem> {
        self.sync.items()
    }

    pub fn state(&self) -> CollectionState<LineItem> {
        self.sync.state()
    }

    pub fn watch(&self) -> watch::Receiver<CollectionState<LineItem>> {
        self.sync.watch()
    }

    /// Wait for the first snapshot of the current subscription.
    pub async fn loaded(&self) -> CollectionState<LineItem> {
        self.sync.loaded().await
    }

    pub fn collection(&self) -> &CollectionSync<LineItem, S> {
        &self.sync
    }

    /// Summary of the current items with the pending patch applied.
    pub fn summary(&self) -> OrderSummary {
        let items = self.items();
        let pending = self.reconcile(&items);
        OrderSummary::derive(&items, pending.as_ref().map(|patch| &patch.item))
    }

    pub fn pending_patch(&self) -> Option<PendingPatch> {
        let items = self.items();
        self.reconcile(&items)
    }

    /// Add an item at quantity 1.
    ///
    /// On a non-empty ledger the item takes the currency and location of the
    /// first item; `currency` only applies to the first item of an order.
    pub async fn add_item(
        &self,
        name: &str,
        unit_price: f64,
        currency: CurrencyCode,
    ) -> Result<Option<LineItem>> {
        let (currency, location) = match self.items().first() {
            Some(first) => (first.currency.clone(), first.location.clone()),
            None => (currency, String::new()),
        };
        let item = LineItem::new(name, unit_price, currency, location, self.clock.stamp())?;

        let Some(stored) = self.sync.add(item).await? else {
            return Ok(None);
        };
        info!("Added {} ({} {})", stored.name, stored.unit_price, stored.currency);

        let body = stored.field_map(ITEM_FIELDS)?;
        let mut patch = PendingPatch::new(stored.clone(), body)
            .ok_or_else(|| Error::WriteError(format!("stored item {} has no key", stored.name)))?;
        patch.acknowledge(self.sync.state().version);
        *self.lock_pending() = Some(patch);
        Ok(Some(stored))
    }

    /// Quantity +1. Returns whether a write was issued.
    pub async fn increment_amount(&self, id: &str) -> Result<bool> {
        let Some(item) = self.current_item(id) else {
            return Ok(false);
        };
        let quantity = item.quantity.saturating_add(1);
        let updated = item.with_quantity(quantity, self.clock.stamp());
        self.write_patch(updated, QUANTITY_FIELDS).await
    }

    /// Quantity -1. A no-op at quantity 1.
    pub async fn decrement_amount(&self, id: &str) -> Result<bool> {
        let Some(item) = self.current_item(id) else {
            return Ok(false);
        };
        if item.quantity <= 1 {
            debug!("Decrement of {} ignored at quantity {}", id, item.quantity);
            return Ok(false);
        }
        let quantity = item.quantity - 1;
        let updated = item.with_quantity(quantity, self.clock.stamp());
        self.write_patch(updated, QUANTITY_FIELDS).await
    }

    pub async fn rename_item(&self, id: &str, name: &str) -> Result<bool> {
        model::validate_name(name)?;
        let Some(item) = self.current_item(id) else {
            return Ok(false);
        };
        let updated = item.with_name(name, self.clock.stamp())?;
        self.write_patch(updated, NAME_FIELDS).await
    }

    pub async fn reprice_item(&self, id: &str, unit_price: f64) -> Result<bool> {
        model::validate_price(unit_price)?;
        let Some(item) = self.current_item(id) else {
            return Ok(false);
        };
        let updated = item.with_unit_price(unit_price, self.clock.stamp())?;
        self.write_patch(updated, PRICE_FIELDS).await
    }

    /// Set the location of every item in one multi-path write.
    pub async fn set_location(&self, location: &str) -> Result<bool> {
        let items = self.items();
        if items.is_empty() {
            return Ok(false);
        }
        let patches = items.iter().filter_map(|item| {
            let mut patch = Map::new();
            patch.insert(fields::LOCATION.to_string(), Value::String(location.to_string()));
            item.id.clone().map(|id| (id, patch))
        });
        let written = self.sync.batch_update(patches).await?;
        if written {
            info!("Location of {} items set to {:?}", items.len(), location);
            self.amend_pending(fields::LOCATION, Value::String(location.to_string()), |item| {
                item.location = location.to_string()
            });
        }
        Ok(written)
    }

    /// Move every item to `currency` in one multi-path write. Prices are kept
    /// as entered. No-op when every item already uses `currency`.
    pub async fn set_currency(&self, currency: &CurrencyCode) -> Result<bool> {
        let items = self.items();
        let patches: Vec<(String, Map<String, Value>)> = items
            .iter()
            .filter(|item| &item.currency != currency)
            .filter_map(|item| {
                let mut patch = Map::new();
                patch.insert(fields::CURRENCY.to_string(), Value::String(currency.to_string()));
                item.id.clone().map(|id| (id, patch))
            })
            .collect();
        let count = patches.len();
        let written = self.sync.batch_update(patches).await?;
        if written {
            info!("Currency of {} items set to {}", count, currency);
            self.amend_pending(fields::CURRENCY, Value::String(currency.to_string()), |item| {
                item.currency = currency.clone()
            });
        }
        Ok(written)
    }

    pub async fn delete_item(&self, id: &str) -> Result<bool> {
        let written = self.sync.remove(id).await?;
        if written {
            self.discard_pending(|patch| patch.item_id == id);
        }
        Ok(written)
    }

    /// Delete every item. No-op on an empty ledger.
    pub async fn delete_all(&self) -> Result<bool> {
        let written = self.sync.remove_all().await?;
        if written {
            self.discard_pending(|_| true);
        }
        Ok(written)
    }

    /// Delete exactly `ids` in one multi-path write.
    pub async fn delete_items(&self, ids: &[String]) -> Result<bool> {
        let written = self.sync.remove_many(ids).await?;
        if written {
            self.discard_pending(|patch| ids.contains(&patch.item_id));
        }
        Ok(written)
    }

    pub fn unsubscribe(&self) {
        self.sync.unsubscribe();
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingPatch>> {
        lock(&self.pending)
    }

    /// Settle the pending patch against `items`; return what is left.
    fn reconcile(&self, items: &[LineItem]) -> Option<PendingPatch> {
        settle(&self.pending, items, self.sync.state().version)
    }

    /// Carry a ledger-wide field change into the pending patch.
    fn amend_pending(&self, field: &str, value: Value, apply: impl FnOnce(&mut LineItem)) {
        if let Some(patch) = self.lock_pending().as_mut() {
            apply(&mut patch.item);
            if let Some(written) = patch.fields.get_mut(field) {
                *written = value;
            }
        }
    }

    fn discard_pending(&self, matches: impl Fn(&PendingPatch) -> bool) {
        let mut pending = self.lock_pending();
        if pending.as_ref().is_some_and(matches) {
            *pending = None;
        }
    }

    /// Freshest known version of item `id`: the pending patch, unless the
    /// snapshot holds a copy stamped after it.
    fn current_item(&self, id: &str) -> Option<LineItem> {
        let items = self.items();
        let patch = self.reconcile(&items).filter(|patch| patch.item_id == id);
        let item = items.into_iter().find(|item| item.id.as_deref() == Some(id));
        match (patch, item) {
            (Some(patch), Some(item)) if patch.is_older_than(&item) => Some(item),
            (Some(patch), _) => Some(patch.item),
            (None, Some(item)) => Some(item),
            (None, None) => {
                debug!("Item {} not in ledger", id);
                None
            }
        }
    }

    /// Record `updated` as the pending patch and write `field_names`.
    ///
    /// The patch is marked acknowledged once the store accepts the write. The
    /// previous patch is restored if the write fails or is skipped.
    async fn write_patch(&self, updated: LineItem, field_names: &[&str]) -> Result<bool> {
        let Some(id) = updated.id.clone() else {
            return Ok(false);
        };
        let fields = updated.field_map(field_names)?;
        let Some(patch) = PendingPatch::new(updated, fields.clone()) else {
            return Ok(false);
        };

        let previous = self.lock_pending().replace(patch.clone());
        let result = self.sync.update(&id, fields).await;

        let version = self.sync.state().version;
        let mut pending = self.lock_pending();
        if pending.as_ref() == Some(&patch) {
            if matches!(result, Ok(true)) {
                if let Some(current) = pending.as_mut() {
                    current.acknowledge(version);
                }
            } else {
                *pending = previous;
            }
        }
        result
    }
}

impl<S: RemoteStore> std::fmt::Debug for OrderLedger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderLedger")
            .field("sync", &self.sync)
            .field("pending", &*self.lock_pending())
            .finish()
    }
}
