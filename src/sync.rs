//! Live mirror of a remote collection.
//!
//! `CollectionSync` owns one background task that follows the auth context:
//! while an authorized principal is signed in it keeps a store subscription
//! open and republishes normalized snapshots, otherwise it publishes an empty
//! collection. Writes go straight to the store and are reflected once the
//! store echoes them back through the subscription.

use crate::auth::{AuthContext, AuthState, Principal};
use crate::error::{Error, Result};
use crate::observability::{LedgerMetrics, NoOpMetrics};
use crate::path::StorePath;
use crate::record::SyncRecord;
use crate::store::RemoteStore;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Caller-supplied post-processing of every snapshot (validation, sorting).
pub type Transform<T> = Arc<dyn Fn(Vec<T>) -> Vec<T> + Send + Sync>;

/// What to mirror and how.
pub struct SyncOptions<T> {
    pub path: String,
    /// Keep only records owned by the signed-in principal (default `true`).
    pub filter_by_owner: bool,
    pub transform: Option<Transform<T>>,
}

impl<T> SyncOptions<T> {
    pub fn new(path: impl Into<String>) -> Self {
        SyncOptions {
            path: path.into(),
            filter_by_owner: true,
            transform: None,
        }
    }

    pub fn with_owner_filter(mut self, enabled: bool) -> Self {
        self.filter_by_owner = enabled;
        self
    }

    pub fn with_transform(mut self, transform: impl Fn(Vec<T>) -> Vec<T> + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }
}

impl<T> Clone for SyncOptions<T> {
    fn clone(&self) -> Self {
        SyncOptions {
            path: self.path.clone(),
            filter_by_owner: self.filter_by_owner,
            transform: self.transform.clone(),
        }
    }
}

/// Published view of a collection.
#[derive(Clone, Debug, PartialEq)]
pub struct CollectionState<T> {
    pub items: Vec<T>,
    /// Waiting for the first snapshot of the current subscription.
    pub loading: bool,
    /// Last subscription or write failure, cleared by the next healthy snapshot.
    pub error: Option<Error>,
    /// Bumped on every published snapshot; never reset.
    pub version: u64,
}

impl<T> Default for CollectionState<T> {
    fn default() -> Self {
        CollectionState {
            items: Vec::new(),
            loading: true,
            error: None,
            version: 0,
        }
    }
}

/// Publishing half shared with the background task.
struct Publisher<T> {
    path: String,
    state: Arc<watch::Sender<CollectionState<T>>>,
    alive: Arc<AtomicBool>,
    metrics: Arc<dyn LedgerMetrics>,
}

impl<T: SyncRecord> Publisher<T> {
    /// Apply `f` unless the sync was torn down. `f` reports whether it changed
    /// anything; unchanged states are not sent.
    fn publish(&self, f: impl FnOnce(&mut CollectionState<T>) -> bool) {
        if !self.alive.load(Ordering::Acquire) {
            return;
        }
        self.state.send_if_modified(f);
    }

    fn snapshot(&self, items: Vec<T>) {
        let mut published = false;
        self.publish(|state| {
            if state.items == items && !state.loading && state.error.is_none() {
                return false;
            }
            state.items = items;
            state.loading = false;
            state.error = None;
            state.version += 1;
            published = true;
            true
        });
        self.metrics.record_snapshot(&self.path, published);
    }

    fn fail(&self, err: Error) {
        warn!("⚠ Subscription {} failed: {}", self.path, err);
        self.metrics.record_error(&self.path, &err.to_string());
        self.publish(|state| {
            state.loading = false;
            state.error = Some(err);
            true
        });
    }

    fn signed_out(&self) {
        self.publish(|state| {
            let changed = !state.items.is_empty() || state.loading || state.error.is_some();
            state.items.clear();
            state.loading = false;
            state.error = None;
            changed
        });
    }

    fn subscribing(&self) {
        self.publish(|state| {
            if state.loading {
                return false;
            }
            state.loading = true;
            true
        });
    }
}

/// Decode a raw collection snapshot into records.
///
/// Entries that fail to decode or validate are dropped with a warning.
pub fn normalize<T: SyncRecord>(
    path: &str,
    value: Value,
    owner: Option<&Principal>,
    options: &SyncOptions<T>,
) -> Vec<T> {
    let map = match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            warn!("⚠ Ignoring non-object snapshot at {}: {}", path, other);
            Map::new()
        }
    };

    let mut items: Vec<T> = map
        .into_iter()
        .filter_map(|(key, entry)| {
            match T::from_store_entry(&key, entry).and_then(|record| record.validate().map(|_| record)) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("⚠ Dropping malformed record {}/{}: {}", path, key, e);
                    None
                }
            }
        })
        .collect();

    if options.filter_by_owner {
        let owner = owner.map(Principal::as_str);
        items.retain(|record| owner.is_some() && record.owner() == owner);
    }

    match &options.transform {
        Some(transform) => transform(items),
        None => items,
    }
}

async fn run<T: SyncRecord, S: RemoteStore>(
    store: S,
    mut auth_rx: watch::Receiver<AuthState>,
    options: SyncOptions<T>,
    publisher: Publisher<T>,
) {
    loop {
        let principal = auth_rx.borrow_and_update().active_principal().cloned();
        let Some(principal) = principal else {
            debug!("No active principal, {} idle", options.path);
            publisher.signed_out();
            if auth_rx.changed().await.is_err() {
                return;
            }
            continue;
        };

        publisher.subscribing();
        let mut stream = match store.subscribe(&options.path) {
            Ok(stream) => stream,
            Err(e) => {
                publisher.fail(e);
                if auth_rx.changed().await.is_err() {
                    return;
                }
                continue;
            }
        };
        debug!("✓ Subscribed {} as {}", options.path, principal);

        loop {
            tokio::select! {
                snapshot = stream.next() => match snapshot {
                    Some(Ok(value)) => {
                        publisher.snapshot(normalize(&options.path, value, Some(&principal), &options));
                    }
                    Some(Err(e)) => publisher.fail(e),
                    None => {
                        publisher.fail(Error::SubscriptionError(format!("{} stream closed", options.path)));
                        if auth_rx.changed().await.is_err() {
                            return;
                        }
                        break;
                    }
                },
                changed = auth_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let next = auth_rx.borrow().active_principal().cloned();
                    if next.as_ref() != Some(&principal) {
                        debug!("Principal changed, dropping subscription {}", options.path);
                        break;
                    }
                }
            }
        }
    }
}

/// Typed live mirror of one store collection with write-through CRUD.
///
/// Every write is a no-op (returning `Ok`) unless an authorized principal is
/// signed in. Failed writes return the error and also expose it through
/// [`CollectionState::error`].
pub struct CollectionSync<T: SyncRecord, S: RemoteStore> {
    store: S,
    auth: AuthContext,
    path: String,
    state: Arc<watch::Sender<CollectionState<T>>>,
    alive: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<dyn LedgerMetrics>,
}

impl<T: SyncRecord, S: RemoteStore> CollectionSync<T, S> {
    /// Start mirroring `options.path`. Must be called inside a tokio runtime.
    pub fn start(store: S, auth: AuthContext, options: SyncOptions<T>) -> Self {
        Self::start_with_metrics(store, auth, options, Arc::new(NoOpMetrics))
    }

    pub fn start_with_metrics(
        store: S,
        auth: AuthContext,
        options: SyncOptions<T>,
        metrics: Arc<dyn LedgerMetrics>,
    ) -> Self {
        let state = Arc::new(watch::channel(CollectionState::default()).0);
        let alive = Arc::new(AtomicBool::new(true));
        let path = options.path.clone();

        let publisher = Publisher {
            path: path.clone(),
            state: Arc::clone(&state),
            alive: Arc::clone(&alive),
            metrics: Arc::clone(&metrics),
        };
        let task = tokio::spawn(run(store.clone(), auth.subscribe(), options, publisher));

        CollectionSync {
            store,
            auth,
            path,
            state,
            alive,
            task: Mutex::new(Some(task)),
            metrics,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn items(&self) -> Vec<T> {
        self.state.borrow().items.clone()
    }

    pub fn state(&self) -> CollectionState<T> {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<CollectionState<T>> {
        self.state.subscribe()
    }

    /// Wait until the current subscription delivered its first snapshot
    /// (or failed).
    pub async fn loaded(&self) -> CollectionState<T> {
        let mut rx = self.watch();
        let state = match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }

    /// Principal writes are attributed to, if writes are allowed.
    pub fn active_principal(&self) -> Option<Principal> {
        self.auth.principal()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Stop mirroring. Idempotent; the last published state stays readable.
    pub fn unsubscribe(&self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        debug!("Unsubscribed {}", self.path);
    }

    /// Create a record under a freshly allocated key, stamped with the
    /// principal. Returns the stored record, or `None` when signed out.
    pub async fn add(&self, record: T) -> Result<Option<T>> {
        let Some(principal) = self.auth.principal() else {
            debug!("add to {} skipped: no active principal", self.path);
            return Ok(None);
        };
        record.validate()?;

        let started = Instant::now();
        let result = async {
            let id = self.store.push(&self.path).await?;
            let record = record.with_id(id.clone()).with_owner(principal.to_string());
            let body = record.to_store_value()?;
            self.store.set(&StorePath::record(&self.path, &id), body).await?;
            Ok::<T, Error>(record)
        }
        .await;

        self.finish(&self.path, started, result).map(Some)
    }

    /// Write `fields` into record `id` as one multi-path update.
    pub async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<bool> {
        self.batch_update([(id.to_string(), fields)]).await
    }

    /// Write fields of several records as one multi-path update.
    pub async fn batch_update(
        &self,
        patches: impl IntoIterator<Item = (String, Map<String, Value>)>,
    ) -> Result<bool> {
        let mut updates = BTreeMap::new();
        for (id, fields) in patches {
            for (field, value) in fields {
                updates.insert(StorePath::field(&self.path, &id, &field), value);
            }
        }
        self.write_batch(updates).await
    }

    pub async fn remove(&self, id: &str) -> Result<bool> {
        if self.auth.principal().is_none() {
            debug!("remove from {} skipped: no active principal", self.path);
            return Ok(false);
        }
        let path = StorePath::record(&self.path, id);
        let started = Instant::now();
        let result = self.store.remove(&path).await;
        self.finish(&path, started, result).map(|_| true)
    }

    /// Remove several records as one multi-path update.
    pub async fn remove_many<I>(&self, ids: I) -> Result<bool>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let updates = ids
            .into_iter()
            .map(|id| (StorePath::record(&self.path, id.as_ref()), Value::Null))
            .collect();
        self.write_batch(updates).await
    }

    /// Remove every currently published record. No-op when there are none.
    pub async fn remove_all(&self) -> Result<bool> {
        let ids: Vec<String> = self
            .state
            .borrow()
            .items
            .iter()
            .filter_map(|record| record.id().map(str::to_string))
            .collect();
        self.remove_many(ids).await
    }

    /// Remove the whole collection path in one write, including entries that
    /// never decoded or belong to other owners. No-op when nothing is
    /// published.
    pub async fn clear(&self) -> Result<bool> {
        if self.state.borrow().items.is_empty() {
            return Ok(false);
        }
        if self.auth.principal().is_none() {
            debug!("clear of {} skipped: no active principal", self.path);
            return Ok(false);
        }
        let started = Instant::now();
        let result = self.store.remove(&self.path).await;
        self.finish(&self.path, started, result).map(|_| true)
    }

    async fn write_batch(&self, updates: BTreeMap<String, Value>) -> Result<bool> {
        if updates.is_empty() {
            return Ok(false);
        }
        if self.auth.principal().is_none() {
            debug!("update of {} skipped: no active principal", self.path);
            return Ok(false);
        }
        let started = Instant::now();
        let result = self.store.update(updates).await;
        self.finish(&self.path, started, result).map(|_| true)
    }

    fn finish<R>(&self, path: &str, started: Instant, result: Result<R>) -> Result<R> {
        match result {
            Ok(value) => {
                self.metrics.record_write(path, started.elapsed());
                Ok(value)
            }
            Err(e) => {
                let err = match e {
                    Error::WriteError(_) | Error::ValidationError(_) | Error::SerializationError(_) => e,
                    other => Error::WriteError(other.to_string()),
                };
                warn!("⚠ Write to {} failed: {}", path, err);
                self.metrics.record_error(path, &err.to_string());
                if self.is_alive() {
                    self.state.send_modify(|state| state.error = Some(err.clone()));
                }
                Err(err)
            }
        }
    }
}

impl<T: SyncRecord, S: RemoteStore> Drop for CollectionSync<T, S> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T: SyncRecord, S: RemoteStore> fmt::Debug for CollectionSync<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionSync")
            .field("path", &self.path)
            .field("items", &self.state.borrow().items.len())
            .field("alive", &self.is_alive())
            .finish()
    }
}
