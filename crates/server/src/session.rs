//! Session cookie middleware.
//!
//! Resolves the caller's session from the cookie, hands the handler a
//! [`Session`] through request extensions, and issues or removes the cookie
//! depending on what the handler did with it.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::debug;

use service::session::CommitOutcome;

use crate::routes::auth::ServerState;

pub use service::session::Session;

/// Session cookie attributes.
#[derive(Clone, Debug)]
pub struct CookieSettings {
    pub name: String,
    pub secure: bool,
}

impl CookieSettings {
    fn issue(&self, id: &str) -> Cookie<'static> {
        let mut cookie = Cookie::new(self.name.clone(), id.to_string());
        cookie.set_path("/");
        cookie.set_http_only(true);
        cookie.set_secure(self.secure);
        cookie.set_same_site(SameSite::Lax);
        cookie
    }

    fn removal(&self) -> Cookie<'static> {
        let mut cookie = Cookie::new(self.name.clone(), "");
        cookie.set_path("/");
        cookie
    }
}

pub async fn with_session(State(state): State<ServerState>, jar: CookieJar, mut req: Request, next: Next) -> Response {
    let incoming = jar.get(&state.cookies.name).map(|c| c.value().to_string());
    let session = state.sessions.load(incoming.as_deref()).await;
    req.extensions_mut().insert(session.clone());

    let response = next.run(req).await;

    let jar = match state.sessions.commit(&session).await {
        CommitOutcome::Created | CommitOutcome::Updated => jar.add(state.cookies.issue(session.id())),
        CommitOutcome::Destroyed => {
            debug!("session emptied; removing cookie");
            jar.remove(state.cookies.removal())
        }
        CommitOutcome::Untouched => jar,
    };
    (jar, response).into_response()
}

/// `Authorization: Bearer <token>` value, if any.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}
