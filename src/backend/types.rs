//! Backend types — identities, sessions, auth events, and errors.
//!
//! Shared by the Supabase HTTP client and the gateways. Wire shapes follow
//! the GoTrue JSON responses so they deserialize without adapters.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced at the backend seam.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// No session is stored. Expected when nobody is signed in.
    #[error("Auth session missing!")]
    SessionMissing,

    /// The HTTP request could not be sent or its body not read.
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status.
    #[error("backend error (status {status}): {message}")]
    Api { status: u16, code: Option<String>, message: String },

    /// The response body did not have the expected shape.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl BackendError {
    /// `true` for the expected "nobody is signed in" condition.
    #[must_use]
    pub fn is_session_missing(&self) -> bool {
        matches!(self, Self::SessionMissing)
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// The authenticated principal as issued by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A signed-in session: tokens plus the user they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: u64,
    /// Unix seconds. Filled from `expires_in` when the server omits it.
    #[serde(default)]
    pub expires_at: Option<u64>,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".into()
}

/// Seconds of slack before expiry at which a session counts as expired.
const EXPIRY_MARGIN_SECS: u64 = 10;

impl Session {
    /// Populate `expires_at` from `expires_in` relative to `now`.
    #[must_use]
    pub fn with_expiry_from(mut self, now: u64) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = Some(now.saturating_add(self.expires_in));
        }
        self
    }

    /// Whether the access token is expired (or about to be) at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at
            .is_some_and(|at| at <= now.saturating_add(EXPIRY_MARGIN_SECS))
    }
}

/// Current unix time in seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Result of a password sign-in or sign-up.
///
/// Sign-up against a project with email confirmation enabled yields a user
/// without a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub user: Option<User>,
    pub session: Option<Session>,
}

// =============================================================================
// OAUTH
// =============================================================================

/// Supported OAuth identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    GitHub,
}

impl OAuthProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
        }
    }
}

/// Result of initiating an OAuth flow: where to send the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthResponse {
    pub provider: OAuthProvider,
    pub url: String,
}

// =============================================================================
// EVENTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Out-of-band session change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    /// The user carried by this event's session, if any.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
