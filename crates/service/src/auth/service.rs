use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use common::metrics::REFRESH_RECOVERIES_TOTAL;

use super::domain::{AuthView, TokenGrant, LOGGED_OUT_MESSAGE, REGISTERED_MESSAGE};
use super::errors::AuthError;
use super::provider::IdentityProvider;
use super::validation::validate_credentials;
use crate::session::{Session, SessionKey};

/// Auth service configuration
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Echo the new access token when `/user` recovers through a refresh.
    pub expose_refreshed_token: bool,
}

/// Auth proxy workflow independent of web framework.
///
/// Tokens issued by the provider are written to the caller's [`Session`] and
/// never returned, except the opt-in echo on the `/user` recovery path.
pub struct AuthService<P: ?Sized = dyn IdentityProvider> {
    provider: Arc<P>,
    cfg: AuthConfig,
}

/// Session state after a successful renewal.
struct Renewed {
    user: Value,
    access_token: Option<String>,
}

impl<P: IdentityProvider + ?Sized> AuthService<P> {
    pub fn new(provider: Arc<P>, cfg: AuthConfig) -> Self { Self { provider, cfg } }

    /// Sign in with email and password.
    ///
    /// # Examples
    /// ```
    /// use service::auth::{AuthService, service::AuthConfig, provider::mock::MockIdentityProvider};
    /// use service::session::Session;
    /// use std::sync::Arc;
    /// let provider = Arc::new(MockIdentityProvider::new().with_account("u@e.com", "Passw0rd"));
    /// let svc = AuthService::new(provider, AuthConfig::default());
    /// let session = Session::detached();
    /// let body = serde_json::json!({"email": "u@e.com", "password": "Passw0rd"});
    /// let view = tokio_test::block_on(svc.login(&session, &body)).unwrap();
    /// assert!(view.authenticated);
    /// assert!(tokio_test::block_on(session.access_token()).is_some());
    /// ```
    #[instrument(skip_all)]
    pub async fn login(&self, session: &Session, body: &Value) -> Result<AuthView, AuthError> {
        let creds = validate_credentials(body)?;
        let grant = self
            .provider
            .sign_in(&creds.email, &creds.password)
            .await
            .map_err(|e| AuthError::Unauthorized(e.to_string()))?;

        remember(session, &grant).await;
        info!(email = %creds.email, "user_logged_in");
        Ok(AuthView::authenticated(grant.user.clone().unwrap_or(Value::Null)).with_extra(grant.public_fields()))
    }

    /// Register a new account. The session is only populated when the provider issued tokens.
    #[instrument(skip_all)]
    pub async fn register(&self, session: &Session, body: &Value) -> Result<AuthView, AuthError> {
        let creds = validate_credentials(body)?;
        let grant = self
            .provider
            .sign_up(&creds.email, &creds.password)
            .await
            .map_err(|e| AuthError::Rejected(e.to_string()))?;

        let user = grant.user.clone().unwrap_or(Value::Null);
        let view = if grant.issued_access_token().is_some() {
            remember(session, &grant).await;
            AuthView::authenticated(user)
        } else {
            AuthView { authenticated: false, ..AuthView::authenticated(user) }
        };
        info!(email = %creds.email, authenticated = view.authenticated, "user_registered");
        Ok(view.with_message(REGISTERED_MESSAGE))
    }

    /// Sign out. Always succeeds from the caller's point of view.
    #[instrument(skip_all)]
    pub async fn logout(&self, session: &Session, bearer: Option<&str>) -> &'static str {
        if let Some(token) = current_access_token(session, bearer).await {
            if let Err(e) = self.provider.sign_out(&token).await {
                debug!(error = %e, "provider sign-out failed; clearing session anyway");
            }
        }
        session.forget_auth().await;
        LOGGED_OUT_MESSAGE
    }

    /// Current user. Never fails: anything irrecoverable yields the guest view.
    ///
    /// A rejected access token gets exactly one recovery attempt through the
    /// session refresh token.
    #[instrument(skip_all)]
    pub async fn current_user(&self, session: &Session, bearer: Option<&str>) -> AuthView {
        let (stored_access, seen_refresh) = session.tokens().await;
        let Some(access) = or_bearer(stored_access, bearer) else {
            return AuthView::guest();
        };

        let err = match self.provider.get_user(&access).await {
            Ok(user) => return AuthView::authenticated(user),
            Err(e) => e,
        };
        debug!(error = %err, "access token rejected; attempting refresh");

        match self.renew(session, seen_refresh.as_deref(), None).await {
            Ok(renewed) => {
                REFRESH_RECOVERIES_TOTAL.with_label_values(&["ok"]).inc();
                let mut view = AuthView::authenticated(renewed.user);
                if self.cfg.expose_refreshed_token {
                    view.access_token = renewed.access_token;
                }
                view
            }
            Err(e) => {
                REFRESH_RECOVERIES_TOTAL.with_label_values(&["failed"]).inc();
                debug!(error = %e, "session could not be recovered");
                session.forget_auth().await;
                AuthView::guest()
            }
        }
    }

    /// Explicit refresh. The session token wins over one supplied in the body.
    #[instrument(skip_all)]
    pub async fn refresh(&self, session: &Session, body_token: Option<&str>) -> Result<AuthView, AuthError> {
        let seen = session.refresh_token().await;
        let fallback = body_token.filter(|t| !t.is_empty()).map(str::to_owned);
        let renewed = self.renew(session, seen.as_deref(), fallback).await?;
        Ok(AuthView::authenticated(renewed.user))
    }

    /// Renew the session tokens, single-flight per session.
    ///
    /// `seen` is the session refresh token the caller observed before waiting
    /// on the lock; if it was rotated meanwhile, the fresh session state is
    /// reused and no provider call is made.
    async fn renew(&self, session: &Session, seen: Option<&str>, fallback: Option<String>) -> Result<Renewed, AuthError> {
        let _guard = session.refresh_lock().await;

        let current = session.refresh_token().await;
        if let (Some(cur), Some(seen)) = (current.as_deref(), seen) {
            if cur != seen {
                debug!("session refreshed by a concurrent request; reusing its tokens");
                return Ok(Renewed {
                    user: session.user().await.unwrap_or(Value::Null),
                    access_token: session.access_token().await,
                });
            }
        }

        let token = current.or(fallback).ok_or(AuthError::MissingRefreshToken)?;
        match self.provider.refresh(&token).await {
            Ok(grant) => {
                remember(session, &grant).await;
                Ok(Renewed { user: grant.user.unwrap_or(Value::Null), access_token: grant.access_token })
            }
            Err(e) => {
                warn!(error = %e, "token refresh rejected; clearing session");
                session.forget_auth().await;
                Err(AuthError::Unauthorized(e.to_string()))
            }
        }
    }
}

/// Session token first, then the bearer header.
async fn current_access_token(session: &Session, bearer: Option<&str>) -> Option<String> {
    or_bearer(session.access_token().await, bearer)
}

fn or_bearer(stored: Option<String>, bearer: Option<&str>) -> Option<String> {
    stored.or_else(|| bearer.filter(|t| !t.is_empty()).map(str::to_owned))
}

/// Overwrite the session auth keys with a provider grant.
async fn remember(session: &Session, grant: &TokenGrant) {
    session
        .set([
            (SessionKey::ACCESS_TOKEN, json!(grant.access_token)),
            (SessionKey::REFRESH_TOKEN, json!(grant.refresh_token)),
            (SessionKey::USER, grant.user.clone().unwrap_or(Value::Null)),
        ])
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::errors::ProviderError;
    use crate::auth::provider::mock::MockIdentityProvider;
    use std::time::Duration;

    fn svc(p: &Arc<MockIdentityProvider>) -> AuthService<MockIdentityProvider> {
        AuthService::new(Arc::clone(p), AuthConfig::default())
    }

    fn creds() -> Value {
        json!({"email": "a@b.co", "password": "secret1"})
    }

    fn provider() -> Arc<MockIdentityProvider> {
        Arc::new(MockIdentityProvider::new().with_account("a@b.co", "secret1"))
    }

    #[tokio::test]
    async fn login_stores_tokens_but_returns_none() {
        let p = provider();
        let s = Session::detached();
        let view = svc(&p).login(&s, &creds()).await.unwrap();
        assert!(view.authenticated);
        assert_eq!(view.user["email"], "a@b.co");
        let body = serde_json::to_value(&view).unwrap();
        assert!(body.get("access_token").is_none());
        assert!(body.get("refresh_token").is_none());
        assert_eq!(body["expires_in"], 3600);
        assert!(s.access_token().await.is_some());
        assert!(s.refresh_token().await.is_some());
        assert_eq!(s.user().await, Some(view.user));
    }

    #[tokio::test]
    async fn login_validation_happens_before_any_provider_call() {
        let p = provider();
        let err = svc(&p).login(&Session::detached(), &json!({"email": "a@b.co"})).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert_eq!(p.calls("sign_in"), 0);
    }

    #[tokio::test]
    async fn bad_credentials_are_unauthorized() {
        let p = provider();
        let s = Session::detached();
        let err = svc(&p).login(&s, &json!({"email": "a@b.co", "password": "wrong-pw"})).await.unwrap_err();
        assert_eq!(err, AuthError::Unauthorized("Invalid login credentials".into()));
        assert!(s.is_empty().await);
    }

    #[tokio::test]
    async fn outage_surfaces_generic_message() {
        let p = provider();
        p.set_unavailable(true);
        let err = svc(&p).login(&Session::detached(), &creds()).await.unwrap_err();
        assert_eq!(err.to_string(), ProviderError::Unavailable.to_string());
    }

    #[tokio::test]
    async fn register_with_and_without_tokens() {
        let p = provider();
        let s = Session::detached();
        let view = svc(&p).register(&s, &json!({"email": "new@b.co", "password": "secret1"})).await.unwrap();
        assert!(view.authenticated);
        assert_eq!(view.message.as_deref(), Some(REGISTERED_MESSAGE));
        assert!(s.access_token().await.is_some());

        p.set_requires_confirmation(true);
        let s = Session::detached();
        let view = svc(&p).register(&s, &json!({"email": "pending@b.co", "password": "secret1"})).await.unwrap();
        assert!(!view.authenticated);
        assert_eq!(view.user["email"], "pending@b.co");
        assert!(s.is_empty().await);

        let err = svc(&p).register(&s, &json!({"email": "a@b.co", "password": "secret1"})).await.unwrap_err();
        assert_eq!(err, AuthError::Rejected("User already registered".into()));
    }

    #[tokio::test]
    async fn logout_clears_session_even_when_provider_fails() {
        let p = provider();
        let s = Session::detached();
        svc(&p).login(&s, &creds()).await.unwrap();
        p.set_unavailable(true);
        assert_eq!(svc(&p).logout(&s, None).await, LOGGED_OUT_MESSAGE);
        assert!(s.is_empty().await);
        assert_eq!(p.calls("sign_out"), 1);
    }

    #[tokio::test]
    async fn logout_without_any_token_skips_provider() {
        let p = provider();
        svc(&p).logout(&Session::detached(), None).await;
        assert_eq!(p.calls("sign_out"), 0);
    }

    #[tokio::test]
    async fn logout_uses_bearer_when_session_has_no_token() {
        let p = provider();
        p.register_access("bearer-1", json!({"id": "b"}));
        svc(&p).logout(&Session::detached(), Some("bearer-1")).await;
        assert_eq!(p.calls("sign_out"), 1);
        let view = svc(&p).current_user(&Session::detached(), Some("bearer-1")).await;
        assert_eq!(view, AuthView::guest());
    }

    #[tokio::test]
    async fn session_token_wins_over_bearer_on_logout() {
        let p = provider();
        p.register_access("bearer-1", json!({"id": "b"}));
        let s = Session::detached();
        svc(&p).login(&s, &creds()).await.unwrap();
        svc(&p).logout(&s, Some("bearer-1")).await;
        // bearer token was not revoked
        let view = svc(&p).current_user(&Session::detached(), Some("bearer-1")).await;
        assert_eq!(view, AuthView::authenticated(json!({"id": "b"})));
    }

    #[tokio::test]
    async fn user_without_token_is_guest() {
        let p = provider();
        let view = svc(&p).current_user(&Session::detached(), None).await;
        assert_eq!(view, AuthView::guest());
        assert_eq!(p.calls("get_user"), 0);
    }

    #[tokio::test]
    async fn user_accepts_bearer_token() {
        let p = provider();
        p.register_access("bearer-1", json!({"id": "b"}));
        let view = svc(&p).current_user(&Session::detached(), Some("bearer-1")).await;
        assert_eq!(view, AuthView::authenticated(json!({"id": "b"})));
    }

    #[tokio::test]
    async fn expired_token_recovers_with_one_refresh() {
        let p = provider();
        let s = Session::detached();
        s.set([
            (SessionKey::ACCESS_TOKEN, json!("expired-token")),
            (SessionKey::REFRESH_TOKEN, json!("valid-refresh-token")),
        ])
        .await;
        p.register_refresh("valid-refresh-token", json!({"id": "user-1", "email": "a@b.co"}));

        let view = svc(&p).current_user(&s, None).await;
        assert!(view.authenticated);
        assert_eq!(view.access_token, None);
        assert_eq!(p.calls("refresh"), 1);
        let fresh = s.access_token().await.unwrap();
        assert_ne!(fresh, "expired-token");
        assert_ne!(s.refresh_token().await.as_deref(), Some("valid-refresh-token"));
    }

    #[tokio::test]
    async fn refreshed_token_is_echoed_only_when_enabled() {
        let p = provider();
        let s = Session::detached();
        s.set([(SessionKey::ACCESS_TOKEN, json!("expired")), (SessionKey::REFRESH_TOKEN, json!("r"))]).await;
        p.register_refresh("r", json!({"id": "u"}));
        let svc = AuthService::new(Arc::clone(&p), AuthConfig { expose_refreshed_token: true });
        let view = svc.current_user(&s, None).await;
        assert_eq!(view.access_token, s.access_token().await);
        assert!(view.access_token.is_some());
    }

    #[tokio::test]
    async fn expired_token_without_refresh_clears_session() {
        let p = provider();
        let s = Session::detached();
        s.set([(SessionKey::ACCESS_TOKEN, json!("expired")), (SessionKey::USER, json!({"id": "u"}))]).await;
        let view = svc(&p).current_user(&s, None).await;
        assert_eq!(view, AuthView::guest());
        assert_eq!(p.calls("refresh"), 0);
        assert!(s.is_empty().await);
    }

    #[tokio::test]
    async fn expired_token_with_invalid_refresh_clears_session() {
        let p = provider();
        let s = Session::detached();
        s.set([(SessionKey::ACCESS_TOKEN, json!("expired")), (SessionKey::REFRESH_TOKEN, json!("bogus"))]).await;
        let view = svc(&p).current_user(&s, None).await;
        assert_eq!(view, AuthView::guest());
        assert_eq!(p.calls("refresh"), 1);
        assert!(s.is_empty().await);
    }

    #[tokio::test]
    async fn valid_session_is_stable_across_calls() {
        let p = provider();
        let s = Session::detached();
        svc(&p).login(&s, &creds()).await.unwrap();
        let first = svc(&p).current_user(&s, None).await;
        let second = svc(&p).current_user(&s, None).await;
        assert_eq!(first, second);
        assert!(first.authenticated);
        assert_eq!(p.calls("refresh"), 0);
    }

    #[tokio::test]
    async fn concurrent_recoveries_refresh_once() {
        let p = provider();
        p.set_refresh_delay(Duration::from_millis(50));
        let s = Session::detached();
        let service = svc(&p);
        service.login(&s, &creds()).await.unwrap();
        p.expire_access_tokens();

        let (a, b) = tokio::join!(service.current_user(&s, None), service.current_user(&s, None));
        assert!(a.authenticated && b.authenticated);
        assert_eq!(a.user, b.user);
        assert_eq!(p.calls("refresh"), 1);
    }

    #[tokio::test]
    async fn refresh_endpoint_paths() {
        let p = provider();
        let s = Session::detached();
        assert_eq!(svc(&p).refresh(&s, None).await.unwrap_err(), AuthError::MissingRefreshToken);
        assert_eq!(svc(&p).refresh(&s, Some("")).await.unwrap_err(), AuthError::MissingRefreshToken);

        p.register_refresh("body-token", json!({"id": "u"}));
        let view = svc(&p).refresh(&s, Some("body-token")).await.unwrap();
        assert_eq!(view, AuthView::authenticated(json!({"id": "u"})));
        assert!(s.refresh_token().await.is_some());

        p.revoke_refresh_tokens();
        let err = svc(&p).refresh(&s, None).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
        assert!(s.is_empty().await);
    }
}
