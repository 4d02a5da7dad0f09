//! Pending local patch shown until the store echoes it back.

use super::model::LineItem;
use serde_json::{Map, Value};
use std::time::Instant;

/// A write this client issued whose effect has not yet arrived in a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingPatch {
    pub item_id: String,
    /// Store fields the write touched, with the values it wrote.
    pub fields: Map<String, Value>,
    /// The item as it looks with the patch applied.
    pub item: LineItem,
    pub applied_at: Instant,
    /// Collection version current when the store acknowledged the write.
    pub acked_at: Option<u64>,
}

impl PendingPatch {
    pub fn new(item: LineItem, fields: Map<String, Value>) -> Option<Self> {
        let item_id = item.id.clone()?;
        Some(PendingPatch {
            item_id,
            fields,
            item,
            applied_at: Instant::now(),
            acked_at: None,
        })
    }

    pub fn acknowledge(&mut self, version: u64) {
        self.acked_at = Some(version);
    }

    /// True once the snapshot at `version` makes the patch redundant: it
    /// carries the written values, or it was published after the store
    /// acknowledged the write. In the latter case the snapshot is
    /// authoritative whatever it holds for the item.
    pub fn is_settled_by(&self, items: &[LineItem], version: u64) -> bool {
        if self.acked_at.is_some_and(|acked| version > acked) {
            return true;
        }
        self.is_reflected_in(items)
    }

    /// True when `current` was stamped strictly after the patched item.
    pub fn is_older_than(&self, current: &LineItem) -> bool {
        current.stamped_at() > self.item.stamped_at()
    }

    /// True once `items` holds the patched item with every patched field at
    /// the written value.
    pub fn is_reflected_in(&self, items: &[LineItem]) -> bool {
        let Some(current) = items.iter().find(|item| item.id.as_deref() == Some(&self.item_id)) else {
            return false;
        };
        let Ok(Value::Object(body)) = serde_json::to_value(current) else {
            return false;
        };
        self.fields
            .iter()
            .all(|(field, value)| body.get(field).is_some_and(|current| same_value(current, value)))
    }
}

/// JSON equality that treats `2` and `2.0` alike.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
