//! Derived view of the active order.

use super::model::LineItem;
use crate::currency::{round2, CurrencyCode};
use std::collections::BTreeMap;

/// Aggregates over the current line items.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderSummary {
    pub totals_by_currency: BTreeMap<CurrencyCode, f64>,
    /// Sum of quantities.
    pub item_count: u64,
    /// Most recently touched item: the pending local patch if any, otherwise
    /// the item with the latest stamp.
    pub last_order: Option<LineItem>,
    /// Location of the first item, or empty.
    pub location: String,
}

impl OrderSummary {
    /// Pure function of the items and an optional locally patched item.
    pub fn derive(items: &[LineItem], pending: Option<&LineItem>) -> Self {
        let mut totals_by_currency: BTreeMap<CurrencyCode, f64> = BTreeMap::new();
        let mut item_count = 0u64;
        for item in items {
            *totals_by_currency.entry(item.currency.clone()).or_insert(0.0) += item.price;
            item_count += u64::from(item.quantity);
        }
        for total in totals_by_currency.values_mut() {
            *total = round2(*total);
        }

        let last_order = pending.cloned().or_else(|| {
            items
                .iter()
                .max_by_key(|item| item.stamped_at())
                .cloned()
        });

        OrderSummary {
            totals_by_currency,
            item_count,
            last_order,
            location: items.first().map(|item| item.location.clone()).unwrap_or_default(),
        }
    }

    pub fn total_for(&self, currency: &CurrencyCode) -> f64 {
        self.totals_by_currency.get(currency).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }
}
