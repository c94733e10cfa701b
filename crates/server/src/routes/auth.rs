use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use serde_json::Value;

use common::types::MessageBody;
use service::auth::{domain::AuthView, AuthService};
use service::session::SessionStore;

use crate::errors::ApiError;
use crate::session::{bearer_token, CookieSettings, Session};

#[derive(Clone)]
pub struct ServerState {
    pub auth: Arc<AuthService>,
    pub sessions: SessionStore,
    pub cookies: CookieSettings,
}

/// Request body as JSON; anything unparseable counts as an empty body.
fn json_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

#[utoipa::path(post, path = "/api/v1/auth/login", tag = "auth", request_body = crate::openapi::CredentialsRequest, responses((status = 200, description = "Logged in", body = crate::openapi::AuthStateResponse), (status = 401, description = "Bad credentials", body = crate::openapi::ErrorResponse), (status = 422, description = "Invalid input", body = crate::openapi::ErrorResponse)))]
pub async fn login(
    State(state): State<ServerState>,
    Extension(session): Extension<Session>,
    body: Bytes,
) -> Result<Json<AuthView>, ApiError> {
    let view = state.auth.login(&session, &json_body(&body)).await?;
    Ok(Json(view))
}

#[utoipa::path(post, path = "/api/v1/auth/register", tag = "auth", request_body = crate::openapi::CredentialsRequest, responses((status = 201, description = "Registered", body = crate::openapi::AuthStateResponse), (status = 422, description = "Invalid input or rejected by provider", body = crate::openapi::ErrorResponse)))]
pub async fn register(
    State(state): State<ServerState>,
    Extension(session): Extension<Session>,
    body: Bytes,
) -> Result<(StatusCode, Json<AuthView>), ApiError> {
    let view = state.auth.register(&session, &json_body(&body)).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[utoipa::path(post, path = "/api/v1/auth/logout", tag = "auth", responses((status = 200, description = "Logged out", body = crate::openapi::MessageResponse)))]
pub async fn logout(
    State(state): State<ServerState>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
) -> Json<MessageBody> {
    let bearer = bearer_token(&headers);
    let message = state.auth.logout(&session, bearer.as_deref()).await;
    Json(MessageBody::new(message))
}

#[utoipa::path(get, path = "/api/v1/auth/user", tag = "auth", responses((status = 200, description = "Current auth state", body = crate::openapi::AuthStateResponse)))]
pub async fn user(
    State(state): State<ServerState>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
) -> Json<AuthView> {
    let bearer = bearer_token(&headers);
    Json(state.auth.current_user(&session, bearer.as_deref()).await)
}

#[utoipa::path(post, path = "/api/v1/auth/refresh", tag = "auth", request_body = crate::openapi::RefreshRequest, responses((status = 200, description = "Refreshed", body = crate::openapi::AuthStateResponse), (status = 401, description = "No or invalid refresh token", body = crate::openapi::ErrorResponse)))]
pub async fn refresh(
    State(state): State<ServerState>,
    Extension(session): Extension<Session>,
    body: Bytes,
) -> Result<Json<AuthView>, ApiError> {
    let body = json_body(&body);
    let token = body.get("refresh_token").and_then(Value::as_str);
    let view = state.auth.refresh(&session, token).await?;
    Ok(Json(view))
}
