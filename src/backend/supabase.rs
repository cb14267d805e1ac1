//! Supabase HTTP client — GoTrue auth and PostgREST data API.
//!
//! DESIGN
//! ======
//! Thin `reqwest` wrapper over `/auth/v1` and `/rest/v1`. The session lives
//! in memory (optionally mirrored to an owner-only JSON file) and every
//! session change is published on a broadcast channel. Response and URL
//! parsing are pure functions for testability.
//!
//! Every authenticated call goes through `fresh_session`, which refreshes an
//! expired access token first. Refreshes are serialized so concurrent calls
//! spend the refresh token once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Url};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

use super::types::{
    AuthEvent, AuthEventKind, AuthResponse, BackendError, OAuthProvider, OAuthResponse, Session, User, unix_now,
};
use super::{AuthBackend, Query, RecordStore};
use crate::config::BackendConfig;

const EVENT_CHANNEL_CAPACITY: usize = 16;
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";

// =============================================================================
// CLIENT
// =============================================================================

pub struct SupabaseClient {
    http: reqwest::Client,
    url: String,
    anon_key: String,
    session: RwLock<Option<Session>>,
    session_file: Option<PathBuf>,
    events: broadcast::Sender<AuthEvent>,
    refresh_lock: Mutex<()>,
}

impl SupabaseClient {
    /// Build a client and restore any persisted session.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;

        let restored = config.session_file.as_deref().and_then(load_session_file);
        if restored.is_some() {
            debug!("restored persisted session");
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            http,
            url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            session: RwLock::new(restored),
            session_file: config.session_file.clone(),
            events,
            refresh_lock: Mutex::new(()),
        })
    }

    /// The currently stored session, if any.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Exchange the stored refresh token for a new session.
    ///
    /// A rejected refresh token clears the session and emits `SignedOut`.
    ///
    /// # Errors
    ///
    /// Returns `SessionMissing` if nothing is stored, otherwise the grant error.
    pub async fn refresh_session(&self) -> Result<Session, BackendError> {
        let current = self.session().ok_or(BackendError::SessionMissing)?;
        let body = serde_json::json!({ "refresh_token": current.refresh_token });

        match self.token_grant("refresh_token", &body).await {
            Ok(session) => {
                debug!("session refreshed");
                self.store_session(Some(session.clone())).await;
                self.emit(AuthEventKind::TokenRefreshed, Some(session.clone()));
                Ok(session)
            }
            Err(e @ BackendError::Api { status: 400 | 401, .. }) => {
                warn!(error = %e, "refresh token rejected; clearing session");
                self.store_session(None).await;
                self.emit(AuthEventKind::SignedOut, None);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Complete an OAuth redirect by reading the tokens from the callback
    /// URL fragment. Returns `None` when the URL carries no session.
    ///
    /// # Errors
    ///
    /// Returns an error if the fragment reports a provider error or the
    /// user lookup fails.
    pub async fn session_from_url(&self, url: &str) -> Result<Option<Session>, BackendError> {
        let Some(tokens) = parse_callback_fragment(url)? else {
            return Ok(None);
        };
        let user = self.fetch_user(&tokens.access_token).await?;
        let session = Session {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_in: tokens.expires_in,
            expires_at: tokens.expires_at,
            user,
        }
        .with_expiry_from(unix_now());

        self.store_session(Some(session.clone())).await;
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(Some(session))
    }

    /// The stored session, refreshed first if its access token has expired.
    async fn fresh_session(&self) -> Result<Option<Session>, BackendError> {
        let current = self.session();
        if !current.as_ref().is_some_and(|s| s.is_expired_at(unix_now())) {
            return Ok(current);
        }
        let _refreshing = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        match self.session() {
            Some(session) if session.is_expired_at(unix_now()) => self.refresh_session().await.map(Some),
            other => Ok(other),
        }
    }

    async fn store_session(&self, session: Option<Session>) {
        if let Some(path) = &self.session_file {
            persist_session_file(path, session.as_ref()).await;
        }
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        // No receivers is fine; nobody is listening yet.
        let _ = self.events.send(AuthEvent { kind, session });
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.url)
    }

    async fn rest_request(&self, method: Method, table: &str) -> Result<RequestBuilder, BackendError> {
        let token = self
            .fresh_session()
            .await?
            .map_or_else(|| self.anon_key.clone(), |s| s.access_token);
        Ok(self
            .http
            .request(method, format!("{}/rest/v1/{table}", self.url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token))
    }

    async fn token_grant(&self, grant_type: &str, body: &Value) -> Result<Session, BackendError> {
        let request = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(body);
        let text = send(request).await?;
        parse_session(&text, unix_now())
    }

    async fn fetch_user(&self, access_token: &str) -> Result<User, BackendError> {
        let request = self
            .http
            .get(self.auth_url("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token);
        let text = send(request).await?;
        serde_json::from_str(&text).map_err(|e| BackendError::Parse(e.to_string()))
    }
}

async fn send(request: RequestBuilder) -> Result<String, BackendError> {
    let response = request
        .send()
        .await
        .map_err(|e| BackendError::Request(e.to_string()))?;

    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| BackendError::Request(e.to_string()))?;

    if !(200..300).contains(&status) {
        return Err(parse_api_error(status, &text));
    }
    Ok(text)
}

// =============================================================================
// AUTH BACKEND
// =============================================================================

#[async_trait::async_trait]
impl AuthBackend for SupabaseClient {
    async fn get_user(&self) -> Result<User, BackendError> {
        let session = self.fresh_session().await?.ok_or(BackendError::SessionMissing)?;
        self.fetch_user(&session.access_token).await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse, BackendError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let session = self.token_grant("password", &body).await?;

        self.store_session(Some(session.clone())).await;
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(AuthResponse { user: Some(session.user.clone()), session: Some(session) })
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthResponse, BackendError> {
        let request = self
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }));
        let text = send(request).await?;
        let response = parse_sign_up(&text, unix_now())?;

        if let Some(session) = &response.session {
            self.store_session(Some(session.clone())).await;
            self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        }
        Ok(response)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(session) = self.session() {
            let response = self
                .http
                .post(self.auth_url("logout"))
                .header("apikey", &self.anon_key)
                .bearer_auth(&session.access_token)
                .send()
                .await
                .map_err(|e| BackendError::Request(e.to_string()))?;

            let status = response.status().as_u16();
            // 401/403/404 mean the server already forgot this session.
            if !response.status().is_success() && !matches!(status, 401 | 403 | 404) {
                let body = response.text().await.unwrap_or_default();
                return Err(parse_api_error(status, &body));
            }
        }

        self.store_session(None).await;
        self.emit(AuthEventKind::SignedOut, None);
        Ok(())
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<OAuthResponse, BackendError> {
        let url = authorize_url(&self.url, provider, redirect_to)?;
        Ok(OAuthResponse { provider, url })
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

// =============================================================================
// RECORD STORE
// =============================================================================

#[async_trait::async_trait]
impl RecordStore for SupabaseClient {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        let request = self
            .rest_request(Method::GET, &query.table)
            .await?
            .query(&select_pairs(query));
        let text = send(request).await?;
        serde_json::from_str(&text).map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn select_single(&self, query: &Query) -> Result<Value, BackendError> {
        let request = self
            .rest_request(Method::GET, &query.table)
            .await?
            .query(&select_pairs(query))
            .header("Accept", SINGLE_OBJECT);
        let text = send(request).await?;
        serde_json::from_str(&text).map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<Value, BackendError> {
        let request = self
            .rest_request(Method::POST, table)
            .await?
            .query(&[("select", "*")])
            .header("Prefer", RETURN_REPRESENTATION)
            .header("Accept", SINGLE_OBJECT)
            .json(row);
        let text = send(request).await?;
        serde_json::from_str(&text).map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn update(&self, query: &Query, patch: &Value) -> Result<Value, BackendError> {
        let request = self
            .rest_request(Method::PATCH, &query.table)
            .await?
            .query(&select_pairs(query))
            .header("Prefer", RETURN_REPRESENTATION)
            .header("Accept", SINGLE_OBJECT)
            .json(patch);
        let text = send(request).await?;
        serde_json::from_str(&text).map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn delete(&self, query: &Query) -> Result<(), BackendError> {
        let request = self
            .rest_request(Method::DELETE, &query.table)
            .await?
            .query(&filter_pairs(query));
        send(request).await?;
        Ok(())
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// PostgREST query-string filters: `column=eq.value`.
fn filter_pairs(query: &Query) -> Vec<(String, String)> {
    query
        .filters
        .iter()
        .map(|(column, value)| (column.clone(), format!("eq.{value}")))
        .collect()
}

/// Full read query: `select=*`, filters, then ordering.
fn select_pairs(query: &Query) -> Vec<(String, String)> {
    let mut pairs = vec![("select".to_string(), "*".to_string())];
    pairs.extend(filter_pairs(query));
    if let Some((column, ascending)) = &query.order {
        let direction = if *ascending { "asc" } else { "desc" };
        pairs.push(("order".to_string(), format!("{column}.{direction}")));
    }
    pairs
}

#[derive(Default, serde::Deserialize)]
struct ErrorBody {
    code: Option<Value>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

/// Normalize GoTrue and PostgREST error bodies.
fn parse_api_error(status: u16, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed
        .error_code
        .or_else(|| parsed.code.and_then(|c| c.as_str().map(str::to_owned)));
    let message = parsed
        .msg
        .or(parsed.message)
        .or(parsed.error_description)
        .or(parsed.error)
        .unwrap_or_else(|| {
            if body.trim().is_empty() { format!("HTTP {status}") } else { body.trim().to_string() }
        });
    BackendError::Api { status, code, message }
}

fn parse_session(body: &str, now: u64) -> Result<Session, BackendError> {
    let session: Session = serde_json::from_str(body).map_err(|e| BackendError::Parse(e.to_string()))?;
    Ok(session.with_expiry_from(now))
}

/// Sign-up answers with a full session when confirmation is off, or with a
/// bare user awaiting email confirmation.
fn parse_sign_up(body: &str, now: u64) -> Result<AuthResponse, BackendError> {
    let value: Value = serde_json::from_str(body).map_err(|e| BackendError::Parse(e.to_string()))?;
    if value.get("access_token").is_some() {
        let session: Session = serde_json::from_value(value).map_err(|e| BackendError::Parse(e.to_string()))?;
        let session = session.with_expiry_from(now);
        return Ok(AuthResponse { user: Some(session.user.clone()), session: Some(session) });
    }
    let user: User = serde_json::from_value(value).map_err(|e| BackendError::Parse(e.to_string()))?;
    Ok(AuthResponse { user: Some(user), session: None })
}

fn authorize_url(base: &str, provider: OAuthProvider, redirect_to: &str) -> Result<String, BackendError> {
    let url = Url::parse_with_params(
        &format!("{base}/auth/v1/authorize"),
        &[("provider", provider.as_str()), ("redirect_to", redirect_to)],
    )
    .map_err(|e| BackendError::Parse(format!("invalid auth URL: {e}")))?;
    Ok(url.into())
}

#[derive(Debug, PartialEq, Eq)]
struct CallbackTokens {
    access_token: String,
    refresh_token: String,
    token_type: String,
    expires_in: u64,
    expires_at: Option<u64>,
}

/// Read session tokens from an OAuth callback URL fragment.
fn parse_callback_fragment(url: &str) -> Result<Option<CallbackTokens>, BackendError> {
    let mut parsed = Url::parse(url).map_err(|e| BackendError::Parse(format!("invalid callback URL: {e}")))?;
    let Some(fragment) = parsed.fragment().map(str::to_owned) else {
        return Ok(None);
    };
    // Reuse the query-string decoder for the fragment.
    parsed.set_query(Some(&fragment));
    let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();

    if let Some(message) = params.get("error_description").or_else(|| params.get("error")) {
        return Err(BackendError::Api {
            status: 400,
            code: params.get("error_code").cloned(),
            message: message.clone(),
        });
    }

    let (Some(access_token), Some(refresh_token)) = (params.get("access_token"), params.get("refresh_token")) else {
        return Ok(None);
    };
    Ok(Some(CallbackTokens {
        access_token: access_token.clone(),
        refresh_token: refresh_token.clone(),
        token_type: params
            .get("token_type")
            .cloned()
            .unwrap_or_else(|| "bearer".into()),
        expires_in: params
            .get("expires_in")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default(),
        expires_at: params.get("expires_at").and_then(|v| v.parse().ok()),
    }))
}

// =============================================================================
// SESSION FILE
// =============================================================================

fn load_session_file(path: &Path) -> Option<Session> {
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "ignoring unreadable session file");
            None
        }
    }
}

/// Mirror the session to disk, or remove the file when signed out.
async fn persist_session_file(path: &Path, session: Option<&Session>) {
    let result = match session {
        Some(session) => match serde_json::to_vec(session) {
            Ok(json) => write_private(path, &json).await,
            Err(e) => Err(std::io::Error::other(e)),
        },
        None => match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        },
    };
    if let Err(e) = result {
        warn!(error = %e, path = %path.display(), "session file update failed");
    }
}

/// Write a file readable by its owner only. The tokens in it are bearer
/// credentials.
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    // `mode` only applies on creation; tighten a file left by an older run.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600)).await?;
    }
    file.write_all(contents).await?;
    file.flush().await
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
