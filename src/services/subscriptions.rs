//! Subscriptions gateway — CRUD on the `subscriptions` table for the
//! signed-in user, mirrored into the local list.
//!
//! DESIGN
//! ======
//! Every query is scoped by `user_id`, so the cache only ever holds the
//! current user's rows. The cache is written strictly after the store
//! confirms; the one exception is a failed fetch, which empties the list
//! rather than leaving rows that may be stale.
//!
//! Calls are not serialized against each other. Two overlapping writes apply
//! to the cache in whatever order their responses arrive.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use crate::backend::{BackendError, Query, RecordStore};
use crate::state::{AppState, LoadingGuard};
use crate::subscription::{InsertRow, NewSubscription, Subscription, SubscriptionPatch, TABLE};

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// Called with nobody signed in. The store was not contacted.
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A payload could not be serialized for the store.
    #[error("subscription encode failed: {0}")]
    Encode(String),

    /// A row from the store did not match the subscription shape.
    #[error("subscription decode failed: {0}")]
    Decode(String),
}

#[derive(Clone)]
pub struct SubscriptionsGateway {
    store: Arc<dyn RecordStore>,
    state: AppState,
}

impl SubscriptionsGateway {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, state: AppState) -> Self {
        Self { store, state }
    }

    /// Replace the local list with the user's subscriptions, soonest billing
    /// date first.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a user (list untouched). Any store or
    /// decode failure empties the list before returning.
    pub async fn fetch_subscriptions(&self) -> Result<(), SubscriptionError> {
        let user_id = self.require_user()?;
        let _loading = LoadingGuard::begin(&self.state.subscriptions);

        let query = Query::table(TABLE)
            .eq("user_id", &user_id)
            .order("next_billing_date", true);
        match self.select_rows(&query).await {
            Ok(items) => {
                debug!(count = items.len(), "fetched subscriptions");
                self.state.subscriptions.send_modify(|s| s.items = items);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "error fetching subscriptions");
                self.state.subscriptions.send_modify(|s| s.items.clear());
                Err(e)
            }
        }
    }

    /// Store a new subscription owned by the current user and append the
    /// stored record to the local list.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a user; otherwise the store or decode
    /// error. The list is untouched on failure.
    pub async fn create_subscription(&self, payload: &NewSubscription) -> Result<Subscription, SubscriptionError> {
        let user_id = self.require_user()?;
        let _loading = LoadingGuard::begin(&self.state.subscriptions);

        let created = self
            .insert_row(&user_id, payload)
            .await
            .inspect_err(|e| error!(error = %e, "error creating subscription"))?;
        self.state
            .subscriptions
            .send_modify(|s| s.items.push(created.clone()));
        Ok(created)
    }

    /// Apply a partial update and replace the local entry with the stored
    /// record.
    ///
    /// If `id` is not in the local list the list is left as it is; no entry
    /// is inserted. The next fetch picks the change up.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a user; otherwise the store or decode
    /// error, including when no row matches `id` for this user.
    pub async fn update_subscription(
        &self,
        id: &str,
        patch: &SubscriptionPatch,
    ) -> Result<Subscription, SubscriptionError> {
        let user_id = self.require_user()?;
        let _loading = LoadingGuard::begin(&self.state.subscriptions);

        let updated = self
            .update_row(&user_id, id, patch)
            .await
            .inspect_err(|e| error!(error = %e, %id, "error updating subscription"))?;
        self.state.subscriptions.send_modify(|s| {
            match s.items.iter_mut().find(|item| item.id == id) {
                Some(slot) => *slot = updated.clone(),
                None => debug!(%id, "updated subscription not in local list"),
            }
        });
        Ok(updated)
    }

    /// Delete a subscription and drop it from the local list. Deleting an id
    /// that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a user; otherwise the store error.
    pub async fn delete_subscription(&self, id: &str) -> Result<(), SubscriptionError> {
        let user_id = self.require_user()?;
        let _loading = LoadingGuard::begin(&self.state.subscriptions);

        let query = Query::table(TABLE).eq("id", id).eq("user_id", &user_id);
        self.store
            .delete(&query)
            .await
            .inspect_err(|e| error!(error = %e, %id, "error deleting subscription"))?;
        self.state
            .subscriptions
            .send_modify(|s| s.items.retain(|item| item.id != id));
        Ok(())
    }

    /// Look up one of the user's subscriptions. The local list is not touched.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a user; otherwise the store or decode error.
    pub async fn get_subscription(&self, id: &str) -> Result<Subscription, SubscriptionError> {
        let user_id = self.require_user()?;
        let _loading = LoadingGuard::begin(&self.state.subscriptions);

        self.select_one(&user_id, id)
            .await
            .inspect_err(|e| error!(error = %e, %id, "error fetching subscription"))
    }

    fn require_user(&self) -> Result<String, SubscriptionError> {
        self.state.user().map(|user| user.id).ok_or_else(|| {
            error!("User not authenticated");
            SubscriptionError::NotAuthenticated
        })
    }

    async fn select_rows(&self, query: &Query) -> Result<Vec<Subscription>, SubscriptionError> {
        let rows = self.store.select(query).await?;
        rows.into_iter().map(decode::<Subscription>).collect()
    }

    async fn select_one(&self, user_id: &str, id: &str) -> Result<Subscription, SubscriptionError> {
        let query = Query::table(TABLE).eq("id", id).eq("user_id", user_id);
        let row = self.store.select_single(&query).await?;
        decode(row)
    }

    async fn insert_row(&self, user_id: &str, payload: &NewSubscription) -> Result<Subscription, SubscriptionError> {
        let row = encode(&InsertRow { payload, user_id })?;
        let stored = self.store.insert(TABLE, &row).await?;
        decode(stored)
    }

    async fn update_row(
        &self,
        user_id: &str,
        id: &str,
        patch: &SubscriptionPatch,
    ) -> Result<Subscription, SubscriptionError> {
        let query = Query::table(TABLE).eq("id", id).eq("user_id", user_id);
        let stored = self.store.update(&query, &encode(patch)?).await?;
        decode(stored)
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, SubscriptionError> {
    serde_json::to_value(value).map_err(|e| SubscriptionError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(row: Value) -> Result<T, SubscriptionError> {
    serde_json::from_value(row).map_err(|e| SubscriptionError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "subscriptions_test.rs"]
mod tests;
