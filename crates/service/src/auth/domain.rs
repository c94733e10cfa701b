use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Provider response fields that carry credentials. None of them may reach the browser.
pub const TOKEN_FIELDS: [&str; 4] = ["access_token", "refresh_token", "provider_token", "provider_refresh_token"];

pub const REGISTERED_MESSAGE: &str =
    "Registration successful. Please check your email if confirmation is required.";
pub const LOGGED_OUT_MESSAGE: &str = "Logged out successfully";

/// Validated email/password pair. Transient, never persisted.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("email", &self.email).field("password", &"<redacted>").finish()
    }
}

/// Token response of the identity provider (password grant, refresh grant, signup).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenGrant {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenGrant {
    /// Access token, if the provider actually issued a non-empty one.
    pub fn issued_access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Remaining provider fields with every token-bearing field removed.
    pub fn public_fields(&self) -> Map<String, Value> {
        self.extra
            .iter()
            .filter(|(k, _)| !TOKEN_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Response body of every auth endpoint that reports auth state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthView {
    pub user: Value,
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Only set on the `/user` recovery path when `expose_refreshed_token` is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthView {
    pub fn guest() -> Self {
        Self { user: Value::Null, authenticated: false, message: None, access_token: None, extra: Map::new() }
    }

    pub fn authenticated(user: Value) -> Self {
        Self { user, authenticated: true, message: None, access_token: None, extra: Map::new() }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = extra
            .into_iter()
            .filter(|(k, _)| !matches!(k.as_str(), "user" | "authenticated" | "message"))
            .collect();
        self
    }
}
