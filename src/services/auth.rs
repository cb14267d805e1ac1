//! Auth gateway — sign-in flows and session bootstrap against the auth service.
//!
//! DESIGN
//! ======
//! Every operation holds a `LoadingGuard` on the auth holder for its whole
//! duration. Backend failures are logged and returned as values; a missing
//! session is the normal signed-out state and is not logged as an error.
//! The user is only written after the backend confirms.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::backend::{AuthBackend, AuthResponse, BackendError, OAuthProvider, OAuthResponse};
use crate::state::{AppState, LoadingGuard};

#[derive(Clone)]
pub struct AuthGateway {
    backend: Arc<dyn AuthBackend>,
    state: AppState,
    oauth_redirect: String,
}

impl AuthGateway {
    /// `oauth_redirect` is where providers send the browser after login.
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, state: AppState, oauth_redirect: String) -> Self {
        Self { backend, state, oauth_redirect }
    }

    /// Restore the user from the current session. Clears the user when there
    /// is no session or the lookup fails.
    pub async fn load_user(&self) {
        let _loading = LoadingGuard::begin(&self.state.auth);
        match self.backend.get_user().await {
            Ok(user) => self.state.set_user(Some(user)),
            Err(e) if e.is_session_missing() => {
                debug!("no active session");
                self.state.set_user(None);
            }
            Err(e) => {
                error!(error = %e, "error loading user");
                self.state.set_user(None);
            }
        }
    }

    /// Email/password sign-in.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the current user is left as it was.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse, BackendError> {
        let _loading = LoadingGuard::begin(&self.state.auth);
        let response = self
            .backend
            .sign_in_with_password(email, password)
            .await
            .inspect_err(|e| error!(error = %e, "error signing in"))?;
        self.state.set_user(response.user.clone());
        Ok(response)
    }

    /// Create an account with email and password.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the current user is left as it was.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthResponse, BackendError> {
        let _loading = LoadingGuard::begin(&self.state.auth);
        let response = self
            .backend
            .sign_up(email, password)
            .await
            .inspect_err(|e| error!(error = %e, "error signing up"))?;
        self.state.set_user(response.user.clone());
        Ok(response)
    }

    /// End the session and clear the user.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the user is kept.
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        let _loading = LoadingGuard::begin(&self.state.auth);
        self.backend
            .sign_out()
            .await
            .inspect_err(|e| error!(error = %e, "error signing out"))?;
        self.state.set_user(None);
        Ok(())
    }

    /// Start the Google OAuth redirect. The user arrives later through the
    /// session listener.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the flow cannot be started.
    pub async fn sign_in_with_google(&self) -> Result<OAuthResponse, BackendError> {
        self.sign_in_with_oauth(OAuthProvider::Google).await
    }

    /// Start the GitHub OAuth redirect.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the flow cannot be started.
    pub async fn sign_in_with_github(&self) -> Result<OAuthResponse, BackendError> {
        self.sign_in_with_oauth(OAuthProvider::GitHub).await
    }

    async fn sign_in_with_oauth(&self, provider: OAuthProvider) -> Result<OAuthResponse, BackendError> {
        let _loading = LoadingGuard::begin(&self.state.auth);
        self.backend
            .sign_in_with_oauth(provider, &self.oauth_redirect)
            .await
            .inspect_err(|e| error!(error = %e, provider = provider.as_str(), "error starting OAuth sign-in"))
    }

    /// Mirror every session change into the auth holder. Each event
    /// overwrites the user with the event's session user, or clears it.
    pub fn spawn_session_listener(&self) -> JoinHandle<()> {
        let mut events = self.backend.on_auth_state_change();
        let state = self.state.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        debug!(kind = ?event.kind, "session changed");
                        state.set_user(event.user().cloned());
                    }
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "session events dropped"),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
