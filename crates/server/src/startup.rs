use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::Router;
use common::utils::logging::{init_logging, LogFormat};
use configs::AppConfig;
use dotenvy::dotenv;
use tower_http::cors::CorsLayer;
use tracing::info;

use service::auth::{service::AuthConfig, AuthService, IdentityProvider, SupabaseClient};
use service::session::SessionStore;

use crate::errors::StartupError;
use crate::routes::{self, auth::ServerState};
use crate::session::CookieSettings;

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

fn bind_addr(cfg: &AppConfig) -> anyhow::Result<SocketAddr> {
    Ok(format!("{}:{}", cfg.server.host, cfg.server.port).parse()?)
}

/// Wire the provider client, session store and cookie settings from config.
pub fn build_state(cfg: &AppConfig) -> anyhow::Result<ServerState> {
    let client = SupabaseClient::new(
        &cfg.supabase.url,
        &cfg.supabase.key,
        Duration::from_secs(cfg.supabase.timeout_secs),
    )?;
    let provider: Arc<dyn IdentityProvider> = Arc::new(client);
    Ok(state_with_provider(provider, cfg))
}

/// Same as [`build_state`] with a caller-chosen identity provider.
pub fn state_with_provider(provider: Arc<dyn IdentityProvider>, cfg: &AppConfig) -> ServerState {
    let auth = AuthService::new(
        provider,
        AuthConfig { expose_refreshed_token: cfg.auth.expose_refreshed_token },
    );
    let sessions = SessionStore::new(
        Duration::from_secs(cfg.session.lifetime_minutes.saturating_mul(60)),
        cfg.session.max_sessions,
    );
    ServerState {
        auth: Arc::new(auth),
        sessions,
        cookies: CookieSettings { name: cfg.session.cookie_name.clone(), secure: cfg.session.secure_cookie },
    }
}

pub fn build_app(state: ServerState, cfg: &AppConfig) -> Router {
    routes::build_router(state, build_cors(), &cfg.server.frontend_dir)
}

/// Public entry: build the app and run the HTTP server
pub async fn run() -> anyhow::Result<()> {
    dotenv().ok();

    let loaded = AppConfig::load_and_validate();
    let format = loaded.as_ref().map(|c| LogFormat::parse(&c.log.format)).unwrap_or_default();
    init_logging(format);
    let cfg = loaded.map_err(|e| StartupError::InvalidConfig(e.to_string()))?;
    info!(supabase = ?cfg.supabase, session = ?cfg.session, "configuration loaded");

    common::env::ensure_frontend(&cfg.server.frontend_dir).await;

    let state = build_state(&cfg)?;
    let app = build_app(state, &cfg);

    // Bind and serve
    let addr = bind_addr(&cfg)?;
    info!(%addr, "starting auth proxy");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
