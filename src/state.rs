//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is created once per process and handed to every gateway at
//! construction. Each holder sits in a `watch` channel so views can
//! subscribe to changes; only the owning gateway (and the session listener,
//! for the user) writes to it.
//!
//! The loading flag is counted: it stays set while any operation on that
//! holder is in flight, and a drop guard resets it on every exit path.

use std::sync::Arc;

use tokio::sync::watch;

use crate::backend::User;
use crate::subscription::Subscription;

// =============================================================================
// HOLDERS
// =============================================================================

/// Authentication state tracking the current user and loading status.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthState {
    pub user: Option<User>,
    pub loading: bool,
    pending: usize,
}

impl Default for AuthState {
    /// Starts loading: nothing is known until the first session bootstrap.
    fn default() -> Self {
        Self { user: None, loading: true, pending: 0 }
    }
}

/// The signed-in user's subscriptions, mirrored from the record store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscriptionsState {
    pub items: Vec<Subscription>,
    pub loading: bool,
    pending: usize,
}

/// State holders whose loading flag is driven by [`LoadingGuard`].
pub trait Loading {
    fn counters(&mut self) -> (&mut bool, &mut usize);
}

impl Loading for AuthState {
    fn counters(&mut self) -> (&mut bool, &mut usize) {
        (&mut self.loading, &mut self.pending)
    }
}

impl Loading for SubscriptionsState {
    fn counters(&mut self) -> (&mut bool, &mut usize) {
        (&mut self.loading, &mut self.pending)
    }
}

// =============================================================================
// LOADING GUARD
// =============================================================================

/// Marks one operation in flight for as long as it is alive.
pub struct LoadingGuard<'a, S: Loading> {
    tx: &'a watch::Sender<S>,
}

impl<'a, S: Loading> LoadingGuard<'a, S> {
    pub fn begin(tx: &'a watch::Sender<S>) -> Self {
        tx.send_modify(|state| {
            let (loading, pending) = state.counters();
            *pending += 1;
            *loading = true;
        });
        Self { tx }
    }
}

impl<S: Loading> Drop for LoadingGuard<'_, S> {
    fn drop(&mut self) {
        self.tx.send_modify(|state| {
            let (loading, pending) = state.counters();
            *pending = pending.saturating_sub(1);
            *loading = *pending > 0;
        });
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Process-wide state container. Clones share the same holders.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<watch::Sender<AuthState>>,
    pub subscriptions: Arc<watch::Sender<SubscriptionsState>>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            auth: Arc::new(watch::Sender::new(AuthState::default())),
            subscriptions: Arc::new(watch::Sender::new(SubscriptionsState::default())),
        }
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.auth.borrow().user.clone()
    }

    /// Overwrite the signed-in user.
    pub fn set_user(&self, user: Option<User>) {
        self.auth.send_modify(|state| state.user = user);
    }

    /// Snapshot of the cached subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.borrow().items.clone()
    }

    #[must_use]
    pub fn auth_loading(&self) -> bool {
        self.auth.borrow().loading
    }

    #[must_use]
    pub fn subscriptions_loading(&self) -> bool {
        self.subscriptions.borrow().loading
    }

    /// Watch auth state changes.
    #[must_use]
    pub fn watch_auth(&self) -> watch::Receiver<AuthState> {
        self.auth.subscribe()
    }

    /// Watch subscription list changes.
    #[must_use]
    pub fn watch_subscriptions(&self) -> watch::Receiver<SubscriptionsState> {
        self.subscriptions.subscribe()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
