use std::sync::Arc;

use super::*;
use crate::backend::mock::{MockBackend, test_user};

fn guard(backend: &Arc<MockBackend>) -> (RouteGuard, AppState) {
    let state = AppState::new();
    let auth = AuthGateway::new(backend.clone(), state.clone(), "http://localhost:3000/app".into());
    (RouteGuard::new(auth, state.clone(), RouteRules::default()), state)
}

// =============================================================================
// RouteRules::decide
// =============================================================================

#[test]
fn decide_table() {
    let rules = RouteRules::default();
    assert_eq!(rules.decide("/app/dashboard", false), Navigation::Redirect("/auth/login".into()));
    assert_eq!(rules.decide("/app/dashboard", true), Navigation::Allow);
    assert_eq!(rules.decide("/auth/login", true), Navigation::Redirect("/app".into()));
    assert_eq!(rules.decide("/auth/login", false), Navigation::Allow);
    assert_eq!(rules.decide("/about", false), Navigation::Allow);
    assert_eq!(rules.decide("/about", true), Navigation::Allow);
}

#[test]
fn decide_app_root_without_user_redirects() {
    assert_eq!(RouteRules::default().decide("/app", false), Navigation::Redirect("/auth/login".into()));
}

// =============================================================================
// RouteGuard
// =============================================================================

#[tokio::test]
async fn protected_path_without_session_redirects_to_login() {
    let backend = Arc::new(MockBackend::new());
    let (guard, _state) = guard(&backend);

    assert_eq!(guard.before_each("/app/dashboard").await, Navigation::Redirect("/auth/login".into()));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn auth_page_with_user_redirects_home() {
    let backend = Arc::new(MockBackend::new());
    let (guard, state) = guard(&backend);
    state.set_user(Some(test_user("u1")));

    assert_eq!(guard.before_each("/auth/login").await, Navigation::Redirect("/app".into()));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn public_path_without_user_is_allowed() {
    let backend = Arc::new(MockBackend::new());
    let (guard, _state) = guard(&backend);

    assert_eq!(guard.before_each("/about").await, Navigation::Allow);
}

#[tokio::test]
async fn bootstrap_restores_session_before_deciding() {
    let backend = Arc::new(MockBackend::new());
    backend.set_session_user(Some(test_user("u1")));
    let (guard, state) = guard(&backend);

    assert_eq!(guard.before_each("/app/dashboard").await, Navigation::Allow);
    assert_eq!(state.user(), Some(test_user("u1")));
    assert!(!state.auth_loading());
}

// =============================================================================
// LoginRequired
// =============================================================================

#[test]
fn login_required_redirects_without_user() {
    let state = AppState::new();
    let guard = LoginRequired::new(state, DEFAULT_LOGIN_PATH);
    assert_eq!(guard.check("/settings"), Navigation::Redirect("/login".into()));
    assert_eq!(guard.check("/login"), Navigation::Allow);
}

#[test]
fn login_required_allows_signed_in_user() {
    let state = AppState::new();
    state.set_user(Some(test_user("u1")));
    let guard = LoginRequired::new(state, DEFAULT_LOGIN_PATH);
    assert_eq!(guard.check("/settings"), Navigation::Allow);
}
