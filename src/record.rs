//! Core record trait that all synchronized records must implement.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

/// Trait that all records mirrored from a store collection must implement.
///
/// # Example
///
/// ```
/// use ledger_kit::SyncRecord;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// pub struct Note {
///     #[serde(default, skip_serializing)]
///     pub id: Option<String>,
///     pub text: String,
///     #[serde(default)]
///     pub user: Option<String>,
/// }
///
/// impl SyncRecord for Note {
///     fn id(&self) -> Option<&str> { self.id.as_deref() }
///     fn with_id(mut self, id: String) -> Self { self.id = Some(id); self }
///     fn owner(&self) -> Option<&str> { self.user.as_deref() }
///     fn with_owner(mut self, owner: String) -> Self { self.user = Some(owner); self }
/// }
/// ```
pub trait SyncRecord:
    Serialize + DeserializeOwned + Clone + PartialEq + Debug + Send + Sync + 'static
{
    /// Field that receives the store key when a record body lacks one.
    const ID_FIELD: &'static str = "id";

    /// Return the store-assigned id, if known.
    fn id(&self) -> Option<&str>;

    /// Attach the store-assigned id.
    fn with_id(self, id: String) -> Self;

    /// Return the identity that owns this record.
    fn owner(&self) -> Option<&str>;

    /// Stamp the owning identity.
    fn with_owner(self, owner: String) -> Self;

    /// Optional: Validate record after decoding.
    ///
    /// Records that fail are dropped from snapshots with a warning.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Encode the record body for the store.
    fn to_store_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Decode one entry of a collection snapshot.
    ///
    /// The entry key is inserted as `ID_FIELD` unless the body already
    /// carries a non-empty value there.
    fn from_store_entry(key: &str, mut value: Value) -> Result<Self> {
        if let Value::Object(map) = &mut value {
            let has_id = map
                .get(Self::ID_FIELD)
                .and_then(Value::as_str)
                .is_some_and(|s| !s.is_empty());
            if !has_id {
                map.insert(Self::ID_FIELD.to_string(), Value::String(key.to_string()));
            }
        }
        serde_json::from_value(value)
            .map_err(|e| Error::DeserializationError(format!("record {}: {}", key, e)))
    }
}
