//! Line items of the active order.

use crate::currency::CurrencyCode;
use crate::error::{Error, Result};
use crate::record::SyncRecord;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Store field names of a line item.
pub mod fields {
    pub const NAME: &str = "itemName";
    pub const UNIT_PRICE: &str = "itemInitialPrice";
    pub const QUANTITY: &str = "itemCalculatedAmount";
    pub const PRICE: &str = "itemCalculatedPrice";
    pub const CURRENCY: &str = "currency";
    pub const DATE: &str = "currentDate";
    pub const TIME: &str = "currentTime";
    pub const LOCATION: &str = "billLocation";
    pub const USER: &str = "user";
}

fn default_quantity() -> u32 {
    1
}

/// One priced entry of the active order, stored under `orderItems/{id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Store key; never written into the record body.
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(rename = "itemName")]
    pub name: String,
    #[serde(rename = "itemInitialPrice")]
    pub unit_price: f64,
    #[serde(rename = "itemCalculatedAmount", default = "default_quantity")]
    pub quantity: u32,
    /// Always `unit_price * quantity`.
    #[serde(rename = "itemCalculatedPrice")]
    pub price: f64,
    pub currency: CurrencyCode,
    #[serde(rename = "currentDate")]
    pub date: NaiveDate,
    #[serde(rename = "currentTime")]
    pub time: NaiveTime,
    #[serde(rename = "billLocation", default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Trimmed, non-empty item name.
pub fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::ValidationError("item name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

/// Finite, strictly positive price.
pub fn validate_price(price: f64) -> Result<f64> {
    if !price.is_finite() || price <= 0.0 {
        return Err(Error::ValidationError(format!(
            "price must be a positive number, got {}",
            price
        )));
    }
    Ok(price)
}

impl LineItem {
    /// New item with quantity 1, not yet stored.
    pub fn new(
        name: &str,
        unit_price: f64,
        currency: CurrencyCode,
        location: impl Into<String>,
        stamp: NaiveDateTime,
    ) -> Result<Self> {
        let name = validate_name(name)?;
        let unit_price = validate_price(unit_price)?;
        Ok(LineItem {
            id: None,
            name,
            unit_price,
            quantity: 1,
            price: unit_price,
            currency,
            date: stamp.date(),
            time: stamp.time(),
            location: location.into(),
            user: None,
        })
    }

    pub fn stamped_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    fn restamp(mut self, stamp: NaiveDateTime) -> Self {
        self.date = stamp.date();
        self.time = stamp.time();
        self
    }

    /// Same item with a new quantity, recomputed price and fresh stamp.
    pub fn with_quantity(mut self, quantity: u32, stamp: NaiveDateTime) -> Self {
        self.quantity = quantity.max(1);
        self.price = self.unit_price * f64::from(self.quantity);
        self.restamp(stamp)
    }

    /// Same item with a new unit price, recomputed price and fresh stamp.
    pub fn with_unit_price(mut self, unit_price: f64, stamp: NaiveDateTime) -> Result<Self> {
        self.unit_price = validate_price(unit_price)?;
        self.price = self.unit_price * f64::from(self.quantity);
        Ok(self.restamp(stamp))
    }

    /// Same item with a new name and fresh stamp.
    pub fn with_name(mut self, name: &str, stamp: NaiveDateTime) -> Result<Self> {
        self.name = validate_name(name)?;
        Ok(self.restamp(stamp))
    }

    /// Selected store fields of this item, ready for a multi-path update.
    pub fn field_map(&self, names: &[&str]) -> Result<Map<String, Value>> {
        let Value::Object(mut body) = self.to_store_value()? else {
            return Err(Error::SerializationError("line item is not an object".to_string()));
        };
        Ok(names
            .iter()
            .filter_map(|name| body.remove(*name).map(|value| (name.to_string(), value)))
            .collect())
    }
}

impl SyncRecord for LineItem {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn with_id(mut self, id: String) -> Self {
        self.id = Some(id);
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
        validate_name(&self.name)?;
        validate_price(self.unit_price)?;
        if self.quantity == 0 {
            return Err(Error::ValidationError("quantity must be at least 1".to_string()));
        }
        if !self.price.is_finite() {
            return Err(Error::ValidationError("computed price is not finite".to_string()));
        }
        CurrencyCode::new(self.currency.as_str())?;
        Ok(())
    }
}
