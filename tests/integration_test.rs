//! Integration tests for ledger-kit
//!
//! These tests drive the ledger, the archive and the sync layer together
//! against the in-memory store.

use ledger_kit::archive::ArchiveService;
use ledger_kit::observability::LogMetrics;
use ledger_kit::store::{InMemoryStore, RemoteStore};
use ledger_kit::{AuthContext, CurrencyCode, Error, LedgerConfig, LineItem, OrderLedger};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn wait_items<S: RemoteStore>(
    ledger: &OrderLedger<S>,
    pred: impl Fn(&[LineItem]) -> bool,
) -> Vec<LineItem> {
    let mut rx = ledger.watch();
    let wait = rx.wait_for(|state| !state.loading && pred(&state.items));
    let state = tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("Timed out waiting for ledger")
        .expect("Ledger task ended");
    let items = state.items.clone();
    items
}

fn setup(store: &InMemoryStore, auth: &AuthContext) -> (Arc<OrderLedger<InMemoryStore>>, ArchiveService<InMemoryStore>) {
    let config = LedgerConfig::default();
    let ledger = Arc::new(OrderLedger::new(store.clone(), auth.clone(), &config));
    let archive = ArchiveService::new(store.clone(), auth.clone(), Arc::clone(&ledger), &config);
    (ledger, archive)
}

fn id_of(item: &LineItem) -> String {
    item.id.clone().expect("stored item has an id")
}

/// Test 1: Build and Archive an Order
///
/// Verifies the full order lifecycle:
/// - Coffee 50 x2, Cake 80, Tea 30 (CZK)
/// - Exactly one archive with totals {CZK: 210}
/// - Ledger empty afterwards
#[tokio::test]
async fn test_build_and_archive_order() {
    init();
    let store = InMemoryStore::new();
    let auth = AuthContext::signed_in("alice@example.com");
    let (ledger, archive) = setup(&store, &auth);

    let coffee = ledger
        .add_item("Coffee", 50.0, CurrencyCode::czk())
        .await
        .expect("Failed to add coffee")
        .expect("Signed in");
    ledger.add_item("Cake", 80.0, CurrencyCode::czk()).await.expect("Failed to add cake");
    ledger.add_item("Tea", 30.0, CurrencyCode::czk()).await.expect("Failed to add tea");
    wait_items(&ledger, |items| items.len() == 3).await;

    ledger.increment_amount(&id_of(&coffee)).await.expect("Failed to increment");
    wait_items(&ledger, |items| items.iter().any(|i| i.quantity == 2)).await;

    let summary = ledger.summary();
    assert_eq!(summary.total_for(&CurrencyCode::czk()), 210.0);
    assert_eq!(summary.item_count, 4);

    let receipt = archive
        .archive_current_order()
        .await
        .expect("Failed to archive")
        .expect("Ledger was not empty");
    assert!(receipt.ledger_cleared);
    assert_eq!(receipt.clear_error, None);
    assert_eq!(receipt.archive.items.len(), 3);
    assert_eq!(receipt.archive.totals_by_currency.len(), 1);
    assert_eq!(receipt.archive.totals_by_currency[&CurrencyCode::czk()], 210.0);

    wait_items(&ledger, |items| items.is_empty()).await;
    let archived = store.read("archive").await;
    assert_eq!(archived.as_object().map(|m| m.len()), Some(1));

    let stored = &archived[&receipt.archive.archive_id];
    assert_eq!(stored["archiveId"], json!(receipt.archive.archive_id));
    assert_eq!(stored["totalsByCurrency"], json!({"CZK": 210.0}));
    assert_eq!(stored["user"], json!("alice@example.com"));
}

/// Test 2: Archiving an Empty Ledger
///
/// Verifies that nothing is pushed or written.
#[tokio::test]
async fn test_archive_empty_ledger_is_noop() {
    init();
    let store = InMemoryStore::new();
    let auth = AuthContext::signed_in("alice@example.com");
    let (ledger, archive) = setup(&store, &auth);
    ledger.loaded().await;

    let receipt = archive.archive_current_order().await.expect("Failed to archive");
    assert!(receipt.is_none());

    let stats = store.stats().await;
    assert_eq!(stats.writes, 0);
    assert_eq!(stats.pushes, 0);
}

/// Test 3: Archive Write Failure
///
/// Verifies that a rejected archive write:
/// - Surfaces a WriteError
/// - Leaves every ledger item in place
#[tokio::test]
async fn test_archive_write_failure_keeps_ledger() {
    init();
    let store = InMemoryStore::new();
    let auth = AuthContext::signed_in("alice@example.com");
    let (ledger, archive) = setup(&store, &auth);

    ledger.add_item("Coffee", 50.0, CurrencyCode::czk()).await.expect("Failed to add");
    ledger.add_item("Cake", 80.0, CurrencyCode::czk()).await.expect("Failed to add");
    wait_items(&ledger, |items| items.len() == 2).await;

    store.reject_writes("archive", "permission denied");
    let err = archive.archive_current_order().await.unwrap_err();
    assert!(matches!(err, Error::WriteError(_)));

    assert_eq!(ledger.items().len(), 2);
    assert_eq!(store.read("orderItems").await.as_object().map(|m| m.len()), Some(2));
    assert_eq!(store.read("archive").await, Value::Null);
}

/// Test 4: Ledger Clear Failure After Archiving
///
/// Verifies that the receipt reports the duplicated order instead of
/// hiding it.
#[tokio::test]
async fn test_ledger_clear_failure_is_reported() {
    init();
    let store = InMemoryStore::new();
    let auth = AuthContext::signed_in("alice@example.com");
    let (ledger, archive) = setup(&store, &auth);

    ledger.add_item("Tea", 30.0, CurrencyCode::czk()).await.expect("Failed to add");
    wait_items(&ledger, |items| items.len() == 1).await;

    store.reject_writes("orderItems", "offline");
    let receipt = archive
        .archive_current_order()
        .await
        .expect("Archive write should succeed")
        .expect("Ledger was not empty");

    assert!(!receipt.ledger_cleared);
    assert!(matches!(receipt.clear_error, Some(Error::WriteError(_))));
    assert!(store.read("archive").await.is_object());
    assert_eq!(ledger.items().len(), 1);
}

/// Test 5: Batched Location Update
///
/// Verifies setLocation on a 2-item ledger is exactly one store write.
#[tokio::test]
async fn test_set_location_is_one_write() {
    init();
    let store = InMemoryStore::new();
    let auth = AuthContext::signed_in("alice@example.com");
    let (ledger, _archive) = setup(&store, &auth);

    ledger.add_item("Coffee", 50.0, CurrencyCode::czk()).await.expect("Failed to add");
    ledger.add_item("Cake", 80.0, CurrencyCode::czk()).await.expect("Failed to add");
    wait_items(&ledger, |items| items.len() == 2).await;

    let before = store.stats().await.writes;
    assert!(ledger.set_location("Cafe X").await.expect("Failed to set location"));
    assert_eq!(store.stats().await.writes, before + 1);

    let items = wait_items(&ledger, |items| items.iter().all(|i| i.location == "Cafe X")).await;
    assert_eq!(items.len(), 2);
    assert_eq!(ledger.summary().location, "Cafe X");
}

/// Test 6: Decrement at Quantity One
///
/// Verifies the decrement floor issues no write.
#[tokio::test]
async fn test_decrement_floor() {
    init();
    let store = InMemoryStore::new();
    let auth = AuthContext::signed_in("alice@example.com");
    let (ledger, _archive) = setup(&store, &auth);

    let tea = ledger
        .add_item("Tea", 30.0, CurrencyCode::czk())
        .await
        .expect("Failed to add")
        .expect("Signed in");
    wait_items(&ledger, |items| items.len() == 1).await;

    let before = store.stats().await.writes;
    assert!(!ledger.decrement_amount(&id_of(&tea)).await.expect("Failed to decrement"));
    assert_eq!(store.stats().await.writes, before);
    assert_eq!(ledger.items()[0].quantity, 1);
}

/// Test 7: Two Clients, One Ledger
///
/// Verifies that edits from one client reach another through the store.
#[tokio::test]
async fn test_remote_changes_are_mirrored() {
    init();
    let store = InMemoryStore::new();
    let (phone, _a) = setup(&store, &AuthContext::signed_in("alice@example.com"));
    let (tablet, _b) = setup(&store, &AuthContext::signed_in("alice@example.com"));

    let cake = phone
        .add_item("Cake", 80.0, CurrencyCode::czk())
        .await
        .expect("Failed to add")
        .expect("Signed in");
    wait_items(&tablet, |items| items.len() == 1).await;

    tablet.increment_amount(&id_of(&cake)).await.expect("Failed to increment");
    let items = wait_items(&phone, |items| items.first().is_some_and(|i| i.quantity == 2)).await;
    assert_eq!(items[0].price, 160.0);
}

/// Test 8: Subscription Failure
///
/// Verifies the error is exposed while the last items stay visible.
#[tokio::test]
async fn test_subscription_error_keeps_last_items() {
    init();
    let store = InMemoryStore::new();
    let auth = AuthContext::signed_in("alice@example.com");
    let (ledger, _archive) = setup(&store, &auth);

    ledger.add_item("Tea", 30.0, CurrencyCode::czk()).await.expect("Failed to add");
    wait_items(&ledger, |items| items.len() == 1).await;

    store.fail_subscription("orderItems", "permission denied");
    let mut rx = ledger.watch();
    let state = rx
        .wait_for(|state| state.error.is_some())
        .await
        .expect("Ledger task ended")
        .clone();

    assert!(matches!(state.error, Some(Error::SubscriptionError(_))));
    assert_eq!(state.items.len(), 1);
}

/// Test 9: Sign Out
///
/// Verifies that signing out:
/// - Clears the mirrored items
/// - Turns writes into no-ops
#[tokio::test]
async fn test_sign_out_clears_ledger_and_blocks_writes() {
    init();
    let store = InMemoryStore::new();
    let auth = AuthContext::signed_in("alice@example.com");
    let (ledger, _archive) = setup(&store, &auth);

    ledger.add_item("Tea", 30.0, CurrencyCode::czk()).await.expect("Failed to add");
    wait_items(&ledger, |items| items.len() == 1).await;

    auth.sign_out();
    wait_items(&ledger, |items| items.is_empty()).await;

    let added = ledger.add_item("Cake", 80.0, CurrencyCode::czk()).await.expect("No-op add");
    assert!(added.is_none());
    assert_eq!(store.read("orderItems").await.as_object().map(|m| m.len()), Some(1));

    // Signing back in restores the mirror
    auth.sign_in("alice@example.com", true);
    wait_items(&ledger, |items| items.len() == 1).await;
}

fn logged_ledger(store: &InMemoryStore, auth: &AuthContext) -> Arc<OrderLedger<InMemoryStore>> {
    Arc::new(OrderLedger::with_metrics(
        store.clone(),
        auth.clone(),
        &LedgerConfig::default(),
        Arc::new(LogMetrics),
    ))
}

/// Test 10: Concurrent Increments From Two Clients
///
/// Verifies that a client's own earlier write never becomes the base for a
/// later command once another client has changed the item:
/// - Phone adds Cake, tablet increments it to 2
/// - Phone sees 2 and increments: the store holds 3, not 2
/// - Phone's last order follows the store
#[tokio::test]
async fn test_remote_increment_not_overwritten() {
    init();
    let store = InMemoryStore::new();
    let auth = AuthContext::signed_in("alice@example.com");
    let phone = logged_ledger(&store, &auth);
    let tablet = logged_ledger(&store, &auth);

    let cake = phone
        .add_item("Cake", 80.0, CurrencyCode::czk())
        .await
        .expect("Failed to add")
        .expect("Signed in");
    let id = id_of(&cake);
    wait_items(&tablet, |items| items.len() == 1).await;

    tablet.increment_amount(&id).await.expect("Failed to increment on tablet");
    wait_items(&phone, |items| items.first().is_some_and(|i| i.quantity == 2)).await;

    assert!(phone.increment_amount(&id).await.expect("Failed to increment on phone"));
    wait_items(&tablet, |items| items.first().is_some_and(|i| i.quantity == 3)).await;

    let stored = store.read(&format!("orderItems/{}", id)).await;
    assert_eq!(stored["itemCalculatedAmount"], json!(3));
    assert_eq!(stored["itemCalculatedPrice"], json!(240.0));

    wait_items(&phone, |items| items.first().is_some_and(|i| i.quantity == 3)).await;
    let last = phone.summary().last_order.expect("Ledger not empty");
    assert_eq!(last.quantity, 3);
    assert_eq!(phone.summary().total_for(&CurrencyCode::czk()), 240.0);

    store.log_stats().await;
}

/// Test 11: Item Deleted by Another Client
///
/// Verifies that a pending local edit does not keep a remotely deleted item
/// alive in the summary.
#[tokio::test]
async fn test_remote_delete_drops_pending_edit() {
    init();
    let store = InMemoryStore::new();
    let auth = AuthContext::signed_in("alice@example.com");
    let phone = logged_ledger(&store, &auth);
    let tablet = logged_ledger(&store, &auth);

    let tea = phone
        .add_item("Tea", 30.0, CurrencyCode::czk())
        .await
        .expect("Failed to add")
        .expect("Signed in");
    wait_items(&tablet, |items| items.len() == 1).await;
    wait_items(&phone, |items| items.len() == 1).await;

    phone.increment_amount(&id_of(&tea)).await.expect("Failed to increment");
    tablet.delete_item(&id_of(&tea)).await.expect("Failed to delete");

    wait_items(&phone, |items| items.is_empty()).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while phone.pending_patch().is_some() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("Pending edit was never dropped");

    let summary = phone.summary();
    assert!(summary.is_empty());
    assert_eq!(summary.last_order, None);
    assert!(!phone.increment_amount(&id_of(&tea)).await.expect("No-op increment"));
}
