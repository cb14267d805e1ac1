//! Application container wiring the backend, state, gateways, and guards.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::backend::{BackendError, Session, SupabaseClient};
use crate::config::BackendConfig;
use crate::services::auth::AuthGateway;
use crate::services::guard::{DEFAULT_LOGIN_PATH, LoginRequired, RouteGuard, RouteRules};
use crate::services::subscriptions::SubscriptionsGateway;
use crate::state::AppState;

/// One per process. Gateways and guards share the same `AppState`.
///
/// Construction spawns the session listener, so it must run inside a tokio
/// runtime. Dropping the container stops the listener.
pub struct App {
    pub state: AppState,
    pub auth: AuthGateway,
    pub subscriptions: SubscriptionsGateway,
    pub guard: RouteGuard,
    pub login_required: LoginRequired,
    supabase: Arc<SupabaseClient>,
    session_listener: JoinHandle<()>,
}

impl App {
    /// Build the Supabase client and everything that depends on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let supabase = Arc::new(SupabaseClient::new(config)?);
        let state = AppState::new();

        let auth = AuthGateway::new(supabase.clone(), state.clone(), config.oauth_redirect());
        let subscriptions = SubscriptionsGateway::new(supabase.clone(), state.clone());
        let guard = RouteGuard::new(auth.clone(), state.clone(), RouteRules::default());
        let login_required = LoginRequired::new(state.clone(), DEFAULT_LOGIN_PATH);
        let session_listener = auth.spawn_session_listener();

        info!(url = %config.url, "backend client initialized");
        Ok(Self { state, auth, subscriptions, guard, login_required, supabase, session_listener })
    }

    /// Finish an OAuth redirect from the callback URL. The user reaches the
    /// auth holder through the session listener.
    ///
    /// # Errors
    ///
    /// Returns the provider or lookup error carried by the callback.
    pub async fn complete_oauth(&self, callback_url: &str) -> Result<Option<Session>, BackendError> {
        self.supabase.session_from_url(callback_url).await
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.session_listener.abort();
    }
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
