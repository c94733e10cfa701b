use utoipa::OpenApi;
use utoipa::ToSchema;

#[derive(ToSchema)]
pub struct HealthResponse { pub status: String }

#[derive(ToSchema)]
pub struct CredentialsRequest { pub email: String, pub password: String }

#[derive(ToSchema)]
pub struct RefreshRequest { pub refresh_token: Option<String> }

/// Auth state as seen by the browser. Never carries provider tokens.
#[derive(ToSchema)]
pub struct AuthStateResponse {
    #[schema(value_type = Option<Object>)]
    pub user: Option<serde_json::Value>,
    pub authenticated: bool,
    pub message: Option<String>,
}

#[derive(ToSchema)]
pub struct ErrorResponse { pub error: String }

#[derive(ToSchema)]
pub struct MessageResponse { pub message: String }

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health,
        crate::routes::auth::login,
        crate::routes::auth::register,
        crate::routes::auth::logout,
        crate::routes::auth::user,
        crate::routes::auth::refresh,
    ),
    components(
        schemas(
            HealthResponse,
            CredentialsRequest,
            RefreshRequest,
            AuthStateResponse,
            ErrorResponse,
            MessageResponse,
        )
    ),
    tags(
        (name = "health"),
        (name = "auth")
    )
)]
pub struct ApiDoc;
