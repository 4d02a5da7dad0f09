//! Remote collection store implementations.

use crate::error::Result;
use futures::stream::BoxStream;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;

#[cfg(feature = "inmemory")]
pub mod inmemory;

#[cfg(feature = "inmemory")]
pub use inmemory::{InMemoryStore, StoreStats};

/// Stream of snapshots for one subscribed path.
///
/// Yields the current value immediately, then one item per change.
/// `Value::Null` means the path is empty. Stream-level failures arrive as `Err`
/// items and do not end the stream.
pub type SnapshotStream = BoxStream<'static, Result<Value>>;

/// Trait for the realtime document store that holds ledgers and archives.
///
/// Abstracts the transport, allowing swappable stores.
/// Implementations: InMemory (default), or any realtime key-value service
/// reachable through subscribe/push/set/update/remove.
///
/// **IMPORTANT:** All methods use `&self`. Implementations use interior
/// mutability and are cheap to clone.
///
/// **ASYNC:** Write futures are `Send` so ledger commands can be spawned onto
/// a runtime.
///
/// Paths are `/`-separated (`"orderItems/{id}/billLocation"`). Writing
/// `Value::Null` deletes the path.
pub trait RemoteStore: Send + Sync + Clone + 'static {
    /// Subscribe to a path.
    ///
    /// # Errors
    /// Returns `Err` if the subscription cannot be established at all.
    fn subscribe(&self, path: &str) -> Result<SnapshotStream>;

    /// Allocate a fresh, unique child key under `path` without writing.
    ///
    /// # Errors
    /// Returns `Err` if the store is unreachable.
    fn push(&self, path: &str) -> impl Future<Output = Result<String>> + Send;

    /// Replace the value at `path`.
    ///
    /// # Errors
    /// Returns `Err(Error::WriteError)` if the store rejects the write.
    fn set(&self, path: &str, value: Value) -> impl Future<Output = Result<()>> + Send;

    /// Multi-path update applied as one write.
    ///
    /// Every path in `updates` is written together; subscribers observe a
    /// single snapshot containing all of them.
    ///
    /// # Errors
    /// Returns `Err(Error::WriteError)` if any path is rejected, in which
    /// case none are applied.
    fn update(&self, updates: BTreeMap<String, Value>) -> impl Future<Output = Result<()>> + Send;

    /// Remove the value at `path`.
    ///
    /// Default implementation writes `Value::Null`.
    ///
    /// # Errors
    /// Returns `Err(Error::WriteError)` if the store rejects the write.
    fn remove(&self, path: &str) -> impl Future<Output = Result<()>> + Send {
        self.set(path, Value::Null)
    }

    /// Health check - verify the store is reachable.
    ///
    /// # Errors
    /// Returns `Err` if the store is not accessible
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send {
        async { Ok(true) }
    }
}
