//! In-memory backend for gateway tests.
//!
//! Counts every call, can fail the next call with a chosen error, and can
//! hold calls open on a gate so tests observe in-flight state.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tokio::sync::{Notify, broadcast};

use super::types::{AuthEvent, AuthEventKind, AuthResponse, BackendError, OAuthProvider, OAuthResponse, Session, User};
use super::{AuthBackend, Query, RecordStore};

pub struct MockBackend {
    calls: AtomicUsize,
    fail_next: Mutex<Option<BackendError>>,
    gate: Mutex<Option<Arc<Notify>>>,
    user: Mutex<Option<User>>,
    rows: Mutex<Vec<Value>>,
    events: broadcast::Sender<AuthEvent>,
}

impl MockBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            calls: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
            gate: Mutex::new(None),
            user: Mutex::new(None),
            rows: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Number of backend calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make the next call fail with `err`.
    pub fn fail_next(&self, err: BackendError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    /// Hold every call until the returned `Notify` is signalled.
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    /// Set the user that `get_user` reports (the "stored session").
    pub fn set_session_user(&self, user: Option<User>) {
        *self.user.lock().unwrap() = user;
    }

    pub fn seed_rows(&self, rows: Vec<Value>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn rows(&self) -> Vec<Value> {
        self.rows.lock().unwrap().clone()
    }

    /// Push a session change as the auth service would.
    pub fn emit(&self, kind: AuthEventKind, user: Option<User>) {
        let session = user.map(session_for);
        let _ = self.events.send(AuthEvent { kind, session });
    }

    async fn enter(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.fail_next.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn matching(&self, query: &Query) -> Vec<Value> {
        let mut rows: Vec<Value> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| matches_filters(row, query))
            .cloned()
            .collect();
        if let Some((column, ascending)) = &query.order {
            rows.sort_by(|a, b| {
                let ord = column_text(a, column).cmp(&column_text(b, column));
                if *ascending { ord } else { ord.reverse() }
            });
        }
        rows
    }
}

pub fn test_user(id: &str) -> User {
    User { id: id.into(), email: Some(format!("{id}@example.com")), created_at: None }
}

pub fn session_for(user: User) -> Session {
    Session {
        access_token: format!("token-{}", user.id),
        refresh_token: "refresh".into(),
        token_type: "bearer".into(),
        expires_in: 3600,
        expires_at: None,
        user,
    }
}

fn column_text(row: &Value, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn matches_filters(row: &Value, query: &Query) -> bool {
    query
        .filters
        .iter()
        .all(|(column, value)| column_text(row, column) == *value)
}

fn no_rows() -> BackendError {
    BackendError::Api {
        status: 406,
        code: Some("PGRST116".into()),
        message: "JSON object requested, multiple (or no) rows returned".into(),
    }
}

#[async_trait::async_trait]
impl AuthBackend for MockBackend {
    async fn get_user(&self) -> Result<User, BackendError> {
        self.enter().await?;
        self.user
            .lock()
            .unwrap()
            .clone()
            .ok_or(BackendError::SessionMissing)
    }

    async fn sign_in_with_password(&self, email: &str, _password: &str) -> Result<AuthResponse, BackendError> {
        self.enter().await?;
        let user = User { id: format!("id-{email}"), email: Some(email.into()), created_at: None };
        *self.user.lock().unwrap() = Some(user.clone());
        Ok(AuthResponse { user: Some(user.clone()), session: Some(session_for(user)) })
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthResponse, BackendError> {
        self.sign_in_with_password(email, password).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.enter().await?;
        *self.user.lock().unwrap() = None;
        Ok(())
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<OAuthResponse, BackendError> {
        self.enter().await?;
        Ok(OAuthResponse {
            provider,
            url: format!("https://mock/authorize?provider={}&redirect_to={redirect_to}", provider.as_str()),
        })
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait::async_trait]
impl RecordStore for MockBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.enter().await?;
        Ok(self.matching(query))
    }

    async fn select_single(&self, query: &Query) -> Result<Value, BackendError> {
        self.enter().await?;
        let mut rows = self.matching(query);
        if rows.len() == 1 { Ok(rows.remove(0)) } else { Err(no_rows()) }
    }

    async fn insert(&self, _table: &str, row: &Value) -> Result<Value, BackendError> {
        self.enter().await?;
        let mut stored = row.clone();
        stored["id"] = Value::String(uuid::Uuid::new_v4().to_string());
        stored["created_at"] = Value::String("2024-01-01T00:00:00Z".into());
        stored["updated_at"] = Value::String("2024-01-01T00:00:00Z".into());
        self.rows.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, query: &Query, patch: &Value) -> Result<Value, BackendError> {
        self.enter().await?;
        let mut rows = self.rows.lock().unwrap();
        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|row| matches_filters(row, query)) {
            if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        if updated.len() == 1 { Ok(updated.remove(0)) } else { Err(no_rows()) }
    }

    async fn delete(&self, query: &Query) -> Result<(), BackendError> {
        self.enter().await?;
        self.rows
            .lock()
            .unwrap()
            .retain(|row| !matches_filters(row, query));
        Ok(())
    }
}
