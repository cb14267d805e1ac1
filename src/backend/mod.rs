//! Backend seam — auth and record-store traits plus the Supabase client.
//!
//! DESIGN
//! ======
//! Gateways talk to the hosted backend only through `AuthBackend` and
//! `RecordStore`, so tests substitute in-memory mocks. `SupabaseClient`
//! implements both over HTTP.

#[cfg(test)]
pub mod mock;
pub mod supabase;
pub mod types;

use tokio::sync::broadcast;

pub use supabase::SupabaseClient;
pub use types::{AuthEvent, AuthEventKind, AuthResponse, BackendError, OAuthProvider, OAuthResponse, Session, User};

// =============================================================================
// AUTH
// =============================================================================

/// Hosted authentication service.
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// Fetch the user of the current session.
    ///
    /// Returns [`BackendError::SessionMissing`] when no session is stored.
    async fn get_user(&self) -> Result<User, BackendError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse, BackendError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthResponse, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Begin an OAuth flow that returns to `redirect_to` once the provider
    /// completes.
    async fn sign_in_with_oauth(&self, provider: OAuthProvider, redirect_to: &str)
    -> Result<OAuthResponse, BackendError>;

    /// Subscribe to session change notifications.
    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent>;
}

// =============================================================================
// RECORD STORE
// =============================================================================

/// A table query: equality filters and an optional ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub table: String,
    pub filters: Vec<(String, String)>,
    pub order: Option<(String, bool)>,
}

impl Query {
    #[must_use]
    pub fn table(name: &str) -> Self {
        Self { table: name.to_owned(), filters: Vec::new(), order: None }
    }

    /// Keep only rows where `column` equals `value`.
    #[must_use]
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.filters.push((column.to_owned(), value.to_owned()));
        self
    }

    #[must_use]
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_owned(), ascending));
        self
    }
}

/// Table-style data API. Rows cross this seam as JSON objects.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, query: &Query) -> Result<Vec<serde_json::Value>, BackendError>;

    /// Select exactly one row; zero or several rows is an error.
    async fn select_single(&self, query: &Query) -> Result<serde_json::Value, BackendError>;

    /// Insert one row and return the stored representation.
    async fn insert(&self, table: &str, row: &serde_json::Value) -> Result<serde_json::Value, BackendError>;

    /// Update the single row matched by `query` and return its new representation.
    async fn update(&self, query: &Query, patch: &serde_json::Value) -> Result<serde_json::Value, BackendError>;

    /// Delete matched rows. Matching nothing is not an error.
    async fn delete(&self, query: &Query) -> Result<(), BackendError>;
}
