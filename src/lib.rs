//! # ledger-kit
//!
//! A realtime shared bill: many clients edit one itemized order, see each
//! other's changes live, convert the running total into a second currency,
//! and archive the finished order.
//!
//! ## Features
//!
//! - **Live collections:** [`CollectionSync`] mirrors any store collection into typed records
//! - **Optimistic ledger:** [`OrderLedger`] shows local edits before the store echoes them
//! - **Safe archival:** [`ArchiveService`] clears the ledger only after the archive is stored
//! - **Cached conversion:** [`CurrencyConverter`] debounces rate lookups and caches them with a TTL
//! - **Store Agnostic:** any realtime key-value store behind [`RemoteStore`]; in-memory by default
//! - **Built-in logging and metrics hooks** via `log` and [`LedgerMetrics`](observability::LedgerMetrics)
//!
//! ## Quick Start
//!
//! ```ignore
//! use ledger_kit::{AuthContext, BillService, LedgerConfig};
//! use ledger_kit::currency::{CurrencyCode, HttpRateProvider};
//! use ledger_kit::store::InMemoryStore;
//!
//! let config = LedgerConfig::default();
//! let auth = AuthContext::signed_in("alice@example.com");
//! let bill = BillService::new(
//!     InMemoryStore::new(),
//!     HttpRateProvider::from_config(&config)?,
//!     auth,
//!     &config,
//! );
//!
//! // 1. Build the order
//! let coffee = bill.add_item("Coffee", 50.0).await?.expect("signed in");
//! bill.ledger().increment_amount(coffee.id.as_deref().unwrap()).await?;
//! bill.ledger().set_location("Cafe X").await?;
//!
//! // 2. Look at it in the other currency
//! bill.set_currency(CurrencyCode::eur()).await?;
//! println!("{:?}", bill.conversion().converted_amount);
//!
//! // 3. Close it
//! let receipt = bill.archive_current_order().await?;
//! ```
//!
//! ### Lower level
//!
//! The pieces can be used on their own:
//!
//! ```ignore
//! use ledger_kit::{CollectionSync, SyncOptions};
//!
//! let notes = CollectionSync::<Note, _>::start(store, auth, SyncOptions::new("notes"));
//! notes.add(Note::new("hello")).await?;
//! ```

#[macro_use]
extern crate log;

pub mod archive;
pub mod auth;
pub mod clock;
pub mod config;
pub mod currency;
pub mod error;
pub mod ledger;
pub mod observability;
pub mod path;
pub mod record;
pub mod service;
pub mod store;
pub mod sync;

// Re-exports for convenience
pub use archive::{ArchiveReceipt, ArchiveService, ArchivedOrder};
pub use auth::{AuthContext, Principal};
pub use config::LedgerConfig;
pub use currency::{CurrencyCode, CurrencyConverter, CurrencyPair, RateProvider};
pub use error::{Error, Result};
pub use ledger::{LineItem, OrderLedger, OrderSummary};
pub use record::SyncRecord;
pub use service::BillService;
pub use store::RemoteStore;
pub use sync::{CollectionState, CollectionSync, SyncOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
