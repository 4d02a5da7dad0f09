//! Authentication context consumed by every store-facing component.
//!
//! Sign-in flows live outside this crate. Whoever owns them pushes the result
//! here; subscriptions and writes follow the current state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Identity of the signed-in user, stamped into the `user` field of records.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(identity: impl Into<String>) -> Self {
        Principal(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(s: &str) -> Self {
        Principal::new(s)
    }
}

impl From<String> for Principal {
    fn from(s: String) -> Self {
        Principal(s)
    }
}

/// Snapshot of the authentication state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthState {
    pub principal: Option<Principal>,
    pub authorized: bool,
}

impl AuthState {
    /// The principal, if one is signed in *and* authorized.
    pub fn active_principal(&self) -> Option<&Principal> {
        self.principal.as_ref().filter(|_| self.authorized)
    }
}

/// Observable authentication state shared by ledger, archive and sync tasks.
///
/// Cheap to clone; all clones observe the same state.
#[derive(Clone)]
pub struct AuthContext {
    tx: Arc<watch::Sender<AuthState>>,
}

impl AuthContext {
    /// Create a signed-out context.
    pub fn new() -> Self {
        AuthContext {
            tx: Arc::new(watch::channel(AuthState::default()).0),
        }
    }

    /// Create a context with an authorized principal already signed in.
    pub fn signed_in(principal: impl Into<Principal>) -> Self {
        let ctx = Self::new();
        ctx.sign_in(principal, true);
        ctx
    }

    /// Replace the signed-in principal.
    pub fn sign_in(&self, principal: impl Into<Principal>, authorized: bool) {
        let principal = principal.into();
        info!("Signed in as {} (authorized: {})", principal, authorized);
        self.tx.send_replace(AuthState {
            principal: Some(principal),
            authorized,
        });
    }

    pub fn sign_out(&self) {
        info!("Signed out");
        self.tx.send_replace(AuthState::default());
    }

    pub fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    /// The principal writes should be attributed to, if writes are allowed.
    pub fn principal(&self) -> Option<Principal> {
        self.tx.borrow().active_principal().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("state", &*self.tx.borrow())
            .finish()
    }
}
