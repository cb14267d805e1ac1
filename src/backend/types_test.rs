use super::*;

fn session_json() -> serde_json::Value {
    serde_json::json!({
        "access_token": "at",
        "refresh_token": "rt",
        "token_type": "bearer",
        "expires_in": 3600,
        "user": { "id": "u1", "email": "a@example.com", "aud": "authenticated" }
    })
}

// =============================================================================
// Session
// =============================================================================

#[test]
fn session_deserializes_without_expires_at() {
    let session: Session = serde_json::from_value(session_json()).unwrap();
    assert_eq!(session.user.id, "u1");
    assert_eq!(session.user.email.as_deref(), Some("a@example.com"));
    assert!(session.expires_at.is_none());
}

#[test]
fn with_expiry_from_fills_missing_expires_at() {
    let session: Session = serde_json::from_value(session_json()).unwrap();
    let session = session.with_expiry_from(1_000);
    assert_eq!(session.expires_at, Some(4_600));
}

#[test]
fn with_expiry_from_keeps_server_value() {
    let mut json = session_json();
    json["expires_at"] = serde_json::json!(50);
    let session: Session = serde_json::from_value(json).unwrap();
    assert_eq!(session.with_expiry_from(1_000).expires_at, Some(50));
}

#[test]
fn is_expired_at_respects_margin() {
    let session: Session = serde_json::from_value(session_json()).unwrap();
    let session = session.with_expiry_from(0);
    assert!(!session.is_expired_at(0));
    assert!(session.is_expired_at(3_595));
    assert!(session.is_expired_at(4_000));
}

#[test]
fn huge_expires_in_saturates() {
    let mut json = session_json();
    json["expires_in"] = serde_json::json!(u64::MAX);
    let session: Session = serde_json::from_value(json).unwrap();
    let session = session.with_expiry_from(1_000);
    assert_eq!(session.expires_at, Some(u64::MAX));
    assert!(!session.is_expired_at(1_000));
    assert!(session.is_expired_at(u64::MAX));
}

#[test]
fn session_without_expiry_never_expires() {
    let mut session: Session = serde_json::from_value(session_json()).unwrap();
    session.expires_at = None;
    assert!(!session.is_expired_at(u64::MAX / 2));
}

// =============================================================================
// Errors and events
// =============================================================================

#[test]
fn session_missing_message_matches_auth_service() {
    assert_eq!(BackendError::SessionMissing.to_string(), "Auth session missing!");
    assert!(BackendError::SessionMissing.is_session_missing());
    assert!(!BackendError::Request("x".into()).is_session_missing());
}

#[test]
fn auth_event_user_reads_session_user() {
    let session: Session = serde_json::from_value(session_json()).unwrap();
    let event = AuthEvent { kind: AuthEventKind::SignedIn, session: Some(session) };
    assert_eq!(event.user().map(|u| u.id.as_str()), Some("u1"));

    let signed_out = AuthEvent { kind: AuthEventKind::SignedOut, session: None };
    assert!(signed_out.user().is_none());
}

#[test]
fn oauth_provider_names() {
    assert_eq!(OAuthProvider::Google.as_str(), "google");
    assert_eq!(OAuthProvider::GitHub.as_str(), "github");
}
