//! Order archival: snapshot the ledger into `archive/`, then clear it.

pub mod model;

pub use model::{ArchivedItem, ArchivedOrder};

use crate::auth::AuthContext;
use crate::config::LedgerConfig;
use crate::error::{Error, Result};
use crate::ledger::OrderLedger;
use crate::observability::{LedgerMetrics, NoOpMetrics};
use crate::store::RemoteStore;
use crate::sync::{CollectionState, CollectionSync, SyncOptions};
use std::cmp::Reverse;
use std::sync::Arc;
use tokio::sync::watch;

/// Outcome of archiving the current order.
#[derive(Clone, Debug, PartialEq)]
pub struct ArchiveReceipt {
    /// The archive as written, including its id.
    pub archive: ArchivedOrder,
    /// Whether the archived items were removed from the ledger.
    ///
    /// `false` means the order now exists both in the archive and in the
    /// ledger; `clear_error` says why.
    pub ledger_cleared: bool,
    pub clear_error: Option<Error>,
}

/// Archive of completed orders, newest first.
pub struct ArchiveService<S: RemoteStore> {
    ledger: Arc<OrderLedger<S>>,
    archives: CollectionSync<ArchivedOrder, S>,
}

impl<S: RemoteStore> ArchiveService<S> {
    /// Start mirroring `config.archive_path`. Must be called inside a tokio runtime.
    pub fn new(store: S, auth: AuthContext, ledger: Arc<OrderLedger<S>>, config: &LedgerConfig) -> Self {
        Self::with_metrics(store, auth, ledger, config, Arc::new(NoOpMetrics))
    }

    pub fn with_metrics(
        store: S,
        auth: AuthContext,
        ledger: Arc<OrderLedger<S>>,
        config: &LedgerConfig,
        metrics: Arc<dyn LedgerMetrics>,
    ) -> Self {
        // Archives are shared between every user of the bill.
        let options = SyncOptions::new(config.archive_path.clone())
            .with_owner_filter(false)
            .with_transform(|mut orders: Vec<ArchivedOrder>| {
                orders.sort_by_key(|order| Reverse(order.stamped_at()));
                orders
            });
        ArchiveService {
            ledger,
            archives: CollectionSync::start_with_metrics(store, auth, options, metrics),
        }
    }

    pub fn ledger(&self) -> &Arc<OrderLedger<S>> {
        &self.ledger
    }

    /// Archive the ledger and, only once the archive is stored, delete exactly
    /// the archived items.
    ///
    /// Returns `Ok(None)` for an empty ledger or without an active principal.
    /// A failed archive write returns the error and leaves the ledger as it
    /// was.
    pub async fn archive_current_order(&self) -> Result<Option<ArchiveReceipt>> {
        let items = self.ledger.items();
        let Some(snapshot) = ArchivedOrder::snapshot(&items) else {
            debug!("Nothing to archive");
            return Ok(None);
        };

        let Some(archive) = self.archives.add(snapshot).await? else {
            return Ok(None);
        };
        info!(
            "Archived order {} ({} items, {:?})",
            archive.archive_id,
            archive.item_count(),
            archive.totals_by_currency
        );

        let ids: Vec<String> = items.iter().filter_map(|item| item.id.clone()).collect();
        let (ledger_cleared, clear_error) = match self.ledger.delete_items(&ids).await {
            Ok(true) => (true, None),
            Ok(false) => {
                warn!("⚠ Order {} archived but ledger left as is", archive.archive_id);
                (false, None)
            }
            Err(e) => {
                warn!("⚠ Order {} archived but ledger not cleared: {}", archive.archive_id, e);
                (false, Some(e))
            }
        };

        Ok(Some(ArchiveReceipt {
            archive,
            ledger_cleared,
            clear_error,
        }))
    }

    /// Archived orders sorted by (date, time), newest first.
    pub fn list_archives(&self) -> Vec<ArchivedOrder> {
        self.archives.items()
    }

    pub fn state(&self) -> CollectionState<ArchivedOrder> {
        self.archives.state()
    }

    pub fn watch(&self) -> watch::Receiver<CollectionState<ArchivedOrder>> {
        self.archives.watch()
    }

    pub async fn loaded(&self) -> CollectionState<ArchivedOrder> {
        self.archives.loaded().await
    }

    /// Remove the whole archive collection in one write, including entries
    /// that failed to decode. No-op when no archive is listed.
    pub async fn delete_all_archives(&self) -> Result<bool> {
        let written = self.archives.clear().await?;
        if written {
            info!("Archives cleared");
        }
        Ok(written)
    }

    pub fn unsubscribe(&self) {
        self.archives.unsubscribe();
    }
}
