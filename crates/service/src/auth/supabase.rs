use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, instrument, warn};

use common::metrics::observe_provider_call;

use super::domain::TokenGrant;
use super::errors::ProviderError;
use super::provider::{IdentityProvider, ProviderResult};

/// Supabase Auth (GoTrue) REST client.
///
/// Every request carries the server-held `apikey` header. Non-success statuses
/// become `ProviderError::Rejected` with the provider's message; transport
/// failures and timeouts become `ProviderError::Unavailable`.
#[derive(Clone)]
pub struct SupabaseClient {
    http: Client,
    auth_base: String,
}

impl SupabaseClient {
    pub fn new(url: &str, key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        let mut apikey = header::HeaderValue::from_str(key)?;
        apikey.set_sensitive(true);
        headers.insert("apikey", apikey);
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        let http = Client::builder().default_headers(headers).timeout(timeout).build()?;
        Ok(Self { http, auth_base: format!("{}/auth/v1", url.trim_end_matches('/')) })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.auth_base, path)
    }

    /// Send one request. Returns the status and the JSON body (`Null` when the body is not JSON).
    async fn send(&self, op: &'static str, req: RequestBuilder) -> Result<(StatusCode, Value), ProviderError> {
        let started = Instant::now();
        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                error!(op, error = %e, timeout = e.is_timeout(), "identity provider call failed");
                observe_provider_call(op, "unavailable", started.elapsed().as_secs_f64());
                return Err(ProviderError::Unavailable);
            }
        };
        let status = resp.status();
        let bytes = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => {
                error!(op, %status, error = %e, "identity provider body read failed");
                observe_provider_call(op, "unavailable", started.elapsed().as_secs_f64());
                return Err(ProviderError::Unavailable);
            }
        };
        let body = serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null);
        let outcome = if status.is_success() { "ok" } else { "rejected" };
        observe_provider_call(op, outcome, started.elapsed().as_secs_f64());
        debug!(op, %status, elapsed_ms = started.elapsed().as_millis() as u64, "identity provider responded");
        Ok((status, body))
    }

    fn decode<T: DeserializeOwned>(op: &'static str, body: Value) -> ProviderResult<T> {
        serde_json::from_value(body).map_err(|e| {
            error!(op, error = %e, "identity provider returned an unexpected body");
            ProviderError::Unavailable
        })
    }

    async fn token(&self, op: &'static str, grant_type: &str, payload: Value) -> ProviderResult<TokenGrant> {
        let req = self.http.post(self.endpoint("token")).query(&[("grant_type", grant_type)]).json(&payload);
        let (status, body) = self.send(op, req).await?;
        if status != StatusCode::OK {
            let fallback = if op == "refresh" { "Token refresh failed" } else { "Authentication failed" };
            return Err(rejected(op, status, &body, &["error_description", "msg"], fallback));
        }
        Self::decode(op, body)
    }
}

/// Pick the first string field present in the error body, else the fallback.
fn error_message(body: &Value, fields: &[&str], fallback: &str) -> String {
    fields
        .iter()
        .find_map(|f| body.get(*f).and_then(Value::as_str))
        .unwrap_or(fallback)
        .to_string()
}

fn rejected(op: &'static str, status: StatusCode, body: &Value, fields: &[&str], fallback: &str) -> ProviderError {
    let message = error_message(body, fields, fallback);
    warn!(op, %status, %message, "identity provider rejected request");
    ProviderError::Rejected(message)
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    #[instrument(skip(self, password))]
    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<TokenGrant> {
        self.token("sign_in", "password", json!({"email": email, "password": password})).await
    }

    #[instrument(skip(self, password))]
    async fn sign_up(&self, email: &str, password: &str) -> ProviderResult<TokenGrant> {
        let req = self.http.post(self.endpoint("signup")).json(&json!({"email": email, "password": password}));
        let (status, body) = self.send("sign_up", req).await?;
        if !matches!(status, StatusCode::OK | StatusCode::CREATED) {
            return Err(rejected("sign_up", status, &body, &["error_description", "msg"], "Registration failed"));
        }
        // GoTrue answers a confirmation-pending signup with the bare user object.
        if body.get("access_token").is_none() && body.get("user").is_none() && body.get("id").is_some() {
            return Ok(TokenGrant { user: Some(body), ..TokenGrant::default() });
        }
        Self::decode("sign_up", body)
    }

    #[instrument(skip_all)]
    async fn sign_out(&self, access_token: &str) -> ProviderResult<()> {
        let req = self.http.post(self.endpoint("logout")).bearer_auth(access_token);
        let (status, body) = self.send("sign_out", req).await?;
        if status != StatusCode::NO_CONTENT {
            return Err(rejected("sign_out", status, &body, &["msg"], "Sign out failed"));
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn get_user(&self, access_token: &str) -> ProviderResult<Value> {
        let req = self.http.get(self.endpoint("user")).bearer_auth(access_token);
        let (status, body) = self.send("get_user", req).await?;
        if status != StatusCode::OK {
            return Err(rejected("get_user", status, &body, &["msg"], "Failed to get user"));
        }
        if body.is_null() {
            error!(op = "get_user", "identity provider returned an empty user");
            return Err(ProviderError::Unavailable);
        }
        Ok(body)
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> ProviderResult<TokenGrant> {
        self.token("refresh", "refresh_token", json!({"refresh_token": refresh_token})).await
    }
}
