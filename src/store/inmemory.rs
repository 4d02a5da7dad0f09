//! In-memory realtime store (default, thread-safe, async).
//!
//! Uses DashMap with one watch channel per top-level collection. Every write
//! to a collection replaces its tree under the channel lock and wakes every
//! subscriber of that collection.

use super::{RemoteStore, SnapshotStream};
use crate::error::{Error, Result};
use crate::path::StorePath;
use dashmap::DashMap;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Current tree of one collection plus any injected stream failure.
#[derive(Clone, Debug, Default)]
struct CollectionSnapshot {
    value: Value,
    error: Option<Error>,
}

impl CollectionSnapshot {
    fn project(&self, pointer: &str) -> Result<Value> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if pointer.is_empty() {
            return Ok(self.value.clone());
        }
        Ok(self.value.pointer(pointer).cloned().unwrap_or(Value::Null))
    }
}

#[derive(Default)]
struct Counters {
    writes: AtomicU64,
    pushes: AtomicU64,
    rejected: AtomicU64,
}

/// Thread-safe async in-memory store.
///
/// Clones share the same data, so one instance can stand in for the shared
/// backend of several clients.
///
/// # Example
///
/// ```no_run
/// use ledger_kit::store::{InMemoryStore, RemoteStore};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     let id = store.push("orderItems").await?;
///     store.set(&format!("orderItems/{}", id), json!({"itemName": "Tea"})).await?;
///
///     let tree = store.read("orderItems").await;
///     assert!(tree.get(&id).is_some());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    collections: Arc<DashMap<String, watch::Sender<CollectionSnapshot>>>,
    rejected: Arc<DashMap<String, String>>,
    counters: Arc<Counters>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        InMemoryStore {
            collections: Arc::new(DashMap::new()),
            rejected: Arc::new(DashMap::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Read the current value at `path` (`Value::Null` when empty).
    pub async fn read(&self, path: &str) -> Value {
        let Ok((collection, rest)) = StorePath::split(path) else {
            return Value::Null;
        };
        let pointer = StorePath::pointer(&rest);
        let Some(tx) = self.collections.get(collection) else {
            return Value::Null;
        };
        let value = tx.borrow().project(&pointer).unwrap_or(Value::Null);
        value
    }

    /// Reject every subsequent write touching `collection`.
    pub fn reject_writes(&self, collection: &str, reason: &str) {
        self.rejected
            .insert(collection.to_string(), reason.to_string());
        warn!("⚠ InMemory writes to {} now rejected: {}", collection, reason);
    }

    /// Accept writes to `collection` again.
    pub fn accept_writes(&self, collection: &str) {
        self.rejected.remove(collection);
    }

    /// Deliver a stream-level failure to every subscriber of `collection`.
    ///
    /// The failure persists until the next successful write.
    pub fn fail_subscription(&self, collection: &str, reason: &str) {
        self.channel(collection, |tx| {
            tx.send_modify(|snap| {
                snap.error = Some(Error::SubscriptionError(reason.to_string()));
            });
        });
    }

    /// Get store statistics.
    pub async fn stats(&self) -> StoreStats {
        StoreStats {
            collections: self.collections.len(),
            writes: self.counters.writes.load(Ordering::Relaxed),
            pushes: self.counters.pushes.load(Ordering::Relaxed),
            rejected_writes: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Print store statistics to debug log.
    pub async fn log_stats(&self) {
        let stats = self.stats().await;
        debug!(
            "Store Stats: {} collections, {} writes ({} rejected), {} pushes",
            stats.collections, stats.writes, stats.rejected_writes, stats.pushes
        );
    }

    fn channel<R>(&self, collection: &str, f: impl FnOnce(&watch::Sender<CollectionSnapshot>) -> R) -> R {
        let entry = self
            .collections
            .entry(collection.to_string())
            .or_insert_with(|| watch::channel(CollectionSnapshot::default()).0);
        f(entry.value())
    }

    fn check_writable(&self, collection: &str) -> Result<()> {
        if let Some(reason) = self.rejected.get(collection) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(Error::WriteError(format!(
                "write to {} rejected: {}",
                collection,
                reason.value()
            )));
        }
        Ok(())
    }

    /// Apply a group of writes to one collection as a single change.
    fn apply(&self, collection: &str, writes: Vec<(Vec<String>, Value)>) {
        self.channel(collection, |tx| {
            tx.send_modify(|snap| {
                snap.error = None;
                for (segments, value) in writes {
                    write_at(&mut snap.value, &segments, value);
                }
            });
        });
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for InMemoryStore {
    fn subscribe(&self, path: &str) -> Result<SnapshotStream> {
        let (collection, rest) = StorePath::split(path)?;
        let pointer = StorePath::pointer(&rest);
        let rx = self.channel(collection, |tx| tx.subscribe());
        debug!("✓ InMemory SUBSCRIBE {}", path);

        let stream = futures::stream::unfold((rx, pointer, true), |(mut rx, pointer, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let snapshot = rx.borrow_and_update().project(&pointer);
            Some((snapshot, (rx, pointer, false)))
        });
        Ok(stream.boxed())
    }

    async fn push(&self, path: &str) -> Result<String> {
        StorePath::split(path)?;
        let id = uuid::Uuid::now_v7().to_string();
        self.counters.pushes.fetch_add(1, Ordering::Relaxed);
        debug!("✓ InMemory PUSH {} -> {}", path, id);
        Ok(id)
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        let (collection, rest) = StorePath::split(path)?;
        self.check_writable(collection)?;
        let segments = rest.into_iter().map(str::to_string).collect();
        self.apply(collection, vec![(segments, value)]);
        debug!("✓ InMemory SET {}", path);
        Ok(())
    }

    async fn update(&self, updates: BTreeMap<String, Value>) -> Result<()> {
        let mut grouped: BTreeMap<String, Vec<(Vec<String>, Value)>> = BTreeMap::new();
        for (path, value) in updates {
            let (collection, rest) = StorePath::split(&path)?;
            let segments = rest.into_iter().map(str::to_string).collect();
            grouped
                .entry(collection.to_string())
                .or_default()
                .push((segments, value));
        }

        // All-or-nothing: reject before touching any collection.
        for collection in grouped.keys() {
            self.check_writable(collection)?;
        }

        let paths: usize = grouped.values().map(Vec::len).sum();
        for (collection, writes) in grouped {
            self.apply(&collection, writes);
        }
        debug!("✓ InMemory UPDATE {} paths", paths);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        // In-memory store is always reachable
        Ok(true)
    }
}

/// Write `value` at `segments` below `root`, creating objects on the way and
/// pruning objects left empty by a delete.
fn write_at(root: &mut Value, segments: &[String], value: Value) {
    let Some((head, tail)) = segments.split_first() else {
        *root = value;
        return;
    };

    if !root.is_object() {
        if value.is_null() {
            return;
        }
        *root = Value::Object(Map::new());
    }
    let Value::Object(map) = root else {
        return;
    };

    if tail.is_empty() {
        if value.is_null() {
            map.remove(head);
        } else {
            map.insert(head.clone(), value);
        }
    } else {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        write_at(child, tail, value);
        if child.is_null() || child.as_object().is_some_and(Map::is_empty) {
            map.remove(head);
        }
    }

    if map.is_empty() {
        *root = Value::Null;
    }
}

/// Store statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreStats {
    pub collections: usize,
    /// Successful set/update/remove calls. A multi-path update counts once.
    pub writes: u64,
    pub pushes: u64,
    pub rejected_writes: u64,
}
