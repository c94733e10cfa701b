//! Environment/runtime helpers
//!
//! Sanity checks run once at startup.

use std::path::Path;

use tracing::warn;

/// Warn when the SPA build directory is missing; the API still works without it.
pub async fn ensure_frontend(frontend_dir: &str) -> bool {
    match tokio::fs::metadata(frontend_dir).await {
        Ok(meta) if meta.is_dir() => {
            if tokio::fs::metadata(Path::new(frontend_dir).join("index.html")).await.is_err() {
                warn!(%frontend_dir, "index.html not found; SPA fallback will 404");
            }
            true
        }
        _ => {
            warn!(%frontend_dir, "frontend assets directory not found; static assets may 404");
            false
        }
    }
}
