//! Route guards — allow or redirect navigation based on the signed-in user.

use crate::services::auth::AuthGateway;
use crate::state::AppState;

/// Outcome of a navigation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    Redirect(String),
}

/// Path conventions the guards enforce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRules {
    /// Everything under this prefix needs a user.
    pub protected_prefix: String,
    /// Sign-in/sign-up pages; signed-in users are sent home.
    pub auth_prefix: String,
    pub login_path: String,
    pub home_path: String,
}

impl Default for RouteRules {
    fn default() -> Self {
        Self {
            protected_prefix: "/app".into(),
            auth_prefix: "/auth/".into(),
            login_path: "/auth/login".into(),
            home_path: "/app".into(),
        }
    }
}

impl RouteRules {
    /// Decide a navigation given whether a user is signed in.
    #[must_use]
    pub fn decide(&self, path: &str, signed_in: bool) -> Navigation {
        if path.starts_with(&self.protected_prefix) && !signed_in {
            return Navigation::Redirect(self.login_path.clone());
        }
        if path.starts_with(&self.auth_prefix) && signed_in {
            return Navigation::Redirect(self.home_path.clone());
        }
        Navigation::Allow
    }
}

/// Global guard run before every navigation. Bootstraps the session when no
/// user is loaded yet.
#[derive(Clone)]
pub struct RouteGuard {
    auth: AuthGateway,
    state: AppState,
    rules: RouteRules,
}

impl RouteGuard {
    #[must_use]
    pub fn new(auth: AuthGateway, state: AppState, rules: RouteRules) -> Self {
        Self { auth, state, rules }
    }

    pub async fn before_each(&self, path: &str) -> Navigation {
        if self.state.user().is_none() {
            self.auth.load_user().await;
        }
        self.rules.decide(path, self.state.user().is_some())
    }
}

/// Per-page guard: any path other than the login page needs a user. Does not
/// bootstrap the session.
#[derive(Clone)]
pub struct LoginRequired {
    state: AppState,
    login_path: String,
}

pub const DEFAULT_LOGIN_PATH: &str = "/login";

impl LoginRequired {
    #[must_use]
    pub fn new(state: AppState, login_path: &str) -> Self {
        Self { state, login_path: login_path.to_owned() }
    }

    #[must_use]
    pub fn check(&self, path: &str) -> Navigation {
        if self.state.user().is_none() && path != self.login_path {
            return Navigation::Redirect(self.login_path.clone());
        }
        Navigation::Allow
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
