//! Archived orders.

use crate::currency::{round2, CurrencyCode};
use crate::error::{Error, Result};
use crate::ledger::LineItem;
use crate::record::SyncRecord;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Line item as frozen into an archive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchivedItem {
    #[serde(rename = "itemName")]
    pub name: String,
    #[serde(rename = "itemInitialPrice")]
    pub unit_price: f64,
    #[serde(rename = "itemCalculatedAmount")]
    pub quantity: u32,
    #[serde(rename = "itemCalculatedPrice")]
    pub price: f64,
    pub currency: CurrencyCode,
}

impl From<&LineItem> for ArchivedItem {
    fn from(item: &LineItem) -> Self {
        ArchivedItem {
            name: item.name.clone(),
            unit_price: item.unit_price,
            quantity: item.quantity,
            price: item.price,
            currency: item.currency.clone(),
        }
    }
}

/// Immutable snapshot of a completed order, stored under `archive/{archiveId}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchivedOrder {
    #[serde(rename = "archiveId", default)]
    pub archive_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub location: String,
    pub items: Vec<ArchivedItem>,
    #[serde(rename = "totalsByCurrency")]
    pub totals_by_currency: BTreeMap<CurrencyCode, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Sum of item prices grouped by currency, rounded to cents.
pub fn totals_by_currency(items: &[ArchivedItem]) -> BTreeMap<CurrencyCode, f64> {
    let mut totals: BTreeMap<CurrencyCode, f64> = BTreeMap::new();
    for item in items {
        *totals.entry(item.currency.clone()).or_insert(0.0) += item.price;
    }
    for total in totals.values_mut() {
        *total = round2(*total);
    }
    totals
}

impl ArchivedOrder {
    /// Snapshot `items`. Date, time and location come from the first item;
    /// totals are recomputed from the snapshot itself. `None` for no items.
    pub fn snapshot(items: &[LineItem]) -> Option<Self> {
        let first = items.first()?;
        let archived: Vec<ArchivedItem> = items.iter().map(ArchivedItem::from).collect();
        Some(ArchivedOrder {
            archive_id: String::new(),
            date: first.date,
            time: first.time,
            location: first.location.clone(),
            totals_by_currency: totals_by_currency(&archived),
            items: archived,
            user: None,
        })
    }

    pub fn stamped_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }
}

impl SyncRecord for ArchivedOrder {
    const ID_FIELD: &'static str = "archiveId";

    fn id(&self) -> Option<&str> {
        Some(self.archive_id.as_str()).filter(|id| !id.is_empty())
    }

    fn with_id(mut self, id: String) -> Self {
        self.archive_id = id;
        self
    }

    fn owner(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn with_owner(mut self, owner: String) -> Self {
        self.user = Some(owner);
        self
    }

    fn validate(&self) -> Result<()> {
        for item in &self.items {
            if item.quantity == 0 || !item.price.is_finite() {
                return Err(Error::ValidationError(format!(
                    "archive {} holds a malformed item {:?}",
                    self.archive_id, item.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line(name: &str, price: f64, quantity: u32, currency: CurrencyCode) -> LineItem {
        let stamp = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap();
        LineItem::new(name, price, currency, "Cafe", stamp)
            .unwrap()
            .with_quantity(quantity, stamp)
    }

    #[test]
    fn test_snapshot_of_empty_ledger_is_none() {
        assert!(ArchivedOrder::snapshot(&[]).is_none());
    }

    #[test]
    fn test_snapshot_totals_use_each_item_currency() {
        let items = vec![
            line("Coffee", 50.0, 2, CurrencyCode::czk()),
            line("Cake", 80.0, 1, CurrencyCode::czk()),
            line("Wine", 4.5, 2, CurrencyCode::eur()),
        ];
        let order = ArchivedOrder::snapshot(&items).unwrap();

        assert_eq!(order.totals_by_currency[&CurrencyCode::czk()], 180.0);
        assert_eq!(order.totals_by_currency[&CurrencyCode::eur()], 9.0);
        assert_eq!(order.location, "Cafe");
        assert_eq!(order.item_count(), 5);
    }

    #[test]
    fn test_store_key_fills_missing_archive_id() {
        let body = json!({
            "date": "2024-05-01",
            "time": "18:30:00",
            "location": "Cafe",
            "items": [],
            "totalsByCurrency": {},
        });
        let order = ArchivedOrder::from_store_entry("k9", body).unwrap();
        assert_eq!(order.id(), Some("k9"));
    }

    #[test]
    fn test_missing_items_list_is_rejected() {
        let body = json!({"date": "2024-05-01", "time": "18:30:00", "totalsByCurrency": {}});
        assert!(ArchivedOrder::from_store_entry("k9", body).is_err());

        let body = json!({"date": "2024-05-01", "time": "18:30:00", "items": "oops", "totalsByCurrency": {}});
        assert!(ArchivedOrder::from_store_entry("k9", body).is_err());
    }
}
