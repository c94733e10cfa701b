//! Client-side mirror of the auth proxy state.
//!
//! [`AuthStore`] is the observable view model `{user, authenticated, loading}`;
//! the application root creates one and hands clones to whoever renders it.
//! [`AuthClient`] talks to `/api/v1/auth/*` with a cookie jar, so the server
//! session follows it between calls, and is the only writer of the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthViewModel {
    pub user: Option<Value>,
    pub authenticated: bool,
    pub loading: bool,
}

impl Default for AuthViewModel {
    fn default() -> Self {
        Self { user: None, authenticated: false, loading: true }
    }
}

/// Shared, observable auth state.
#[derive(Clone)]
pub struct AuthStore {
    tx: Arc<watch::Sender<AuthViewModel>>,
}

impl Default for AuthStore {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(AuthViewModel::default());
        Self { tx: Arc::new(tx) }
    }
}

impl AuthStore {
    pub fn new() -> Self { Self::default() }

    pub fn snapshot(&self) -> AuthViewModel {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthViewModel> {
        self.tx.subscribe()
    }

    fn signed_in(&self, user: Value) {
        self.tx.send_modify(|m| {
            m.user = Some(user).filter(|u| !u.is_null());
            m.authenticated = true;
        });
    }

    fn signed_out(&self) {
        self.tx.send_modify(|m| {
            m.user = None;
            m.authenticated = false;
        });
    }

    fn done_loading(&self) {
        self.tx.send_modify(|m| m.loading = false);
    }
}

/// Result of a login/register/refresh call.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthOutcome {
    pub error: Option<String>,
    /// Response body on success, `Null` otherwise.
    pub body: Value,
}

impl AuthOutcome {
    fn ok(body: Value) -> Self { Self { error: None, body } }
    fn failed(error: String) -> Self { Self { error: Some(error), body: Value::Null } }
}

pub struct AuthClient {
    http: Client,
    base: String,
    store: AuthStore,
    initialized: AtomicBool,
}

impl AuthClient {
    /// `base_url` is the site origin; endpoints live under `/api/v1/auth`.
    pub fn new(base_url: &str, store: AuthStore) -> Result<Self, ClientError> {
        let http = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base: format!("{}/api/v1/auth", base_url.trim_end_matches('/')),
            store,
            initialized: AtomicBool::new(false),
        })
    }

    pub fn store(&self) -> &AuthStore {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    /// Load the current session once per client. Any failure means signed out.
    pub async fn initialize_auth(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        match fetch_json(self.http.get(self.url("user")).send().await).await {
            Ok(body) if body.get("authenticated") == Some(&Value::Bool(true)) => {
                self.store.signed_in(body.get("user").cloned().unwrap_or(Value::Null));
            }
            Ok(_) => self.store.signed_out(),
            Err(e) => {
                debug!(error = %e, "auth initialization failed; assuming signed out");
                self.store.signed_out();
            }
        }
        self.store.done_loading();
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthOutcome {
        let req = self.http.post(self.url("login")).json(&json!({"email": email, "password": password}));
        match fetch_json(req.send().await).await {
            Ok(body) => {
                self.store.signed_in(body.get("user").cloned().unwrap_or(Value::Null));
                AuthOutcome::ok(body)
            }
            Err(e) => AuthOutcome::failed(e.or("Login failed")),
        }
    }

    /// Register; the store only changes when the server signed the user in.
    pub async fn register(&self, email: &str, password: &str) -> AuthOutcome {
        let req = self.http.post(self.url("register")).json(&json!({"email": email, "password": password}));
        match fetch_json(req.send().await).await {
            Ok(body) => {
                if body.get("authenticated") == Some(&Value::Bool(true)) {
                    self.store.signed_in(body.get("user").cloned().unwrap_or(Value::Null));
                }
                AuthOutcome::ok(body)
            }
            Err(e) => AuthOutcome::failed(e.or("Registration failed")),
        }
    }

    pub async fn refresh(&self) -> AuthOutcome {
        match fetch_json(self.http.post(self.url("refresh")).send().await).await {
            Ok(body) => {
                self.store.signed_in(body.get("user").cloned().unwrap_or(Value::Null));
                AuthOutcome::ok(body)
            }
            Err(e) => {
                self.store.signed_out();
                AuthOutcome::failed(e.or("Token refresh failed"))
            }
        }
    }

    /// Local state is cleared whatever the server says.
    pub async fn logout(&self) {
        if let Err(e) = self.http.post(self.url("logout")).send().await {
            debug!(error = %e, "logout request failed; clearing local state anyway");
        }
        self.store.signed_out();
    }
}

async fn fetch_json(sent: reqwest::Result<Response>) -> Result<Value, CallError> {
    let resp = sent.map_err(|e| CallError::Transport(e.to_string()))?;
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(body);
    }
    let message = body.get("error").and_then(Value::as_str).map(str::to_string);
    Err(CallError::Status(status.as_u16(), message))
}

#[derive(Debug, Error)]
enum CallError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("status {0}")]
    Status(u16, Option<String>),
}

impl CallError {
    /// Server-provided message, else the caller's fallback.
    fn or(self, fallback: &str) -> String {
        match self {
            CallError::Status(_, Some(msg)) => msg,
            _ => fallback.to_string(),
        }
    }
}
