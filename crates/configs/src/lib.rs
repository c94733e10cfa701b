use anyhow::Result;
use serde::Deserialize;
use anyhow::{anyhow, Context};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_frontend_dir")]
    pub frontend_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8080, frontend_dir: default_frontend_dir() }
    }
}

/// Identity provider connection. The key never leaves the server.
#[derive(Clone, Deserialize)]
pub struct SupabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self { url: String::new(), key: String::new(), timeout_secs: default_timeout() }
    }
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_lifetime")]
    pub lifetime_minutes: u64,
    #[serde(default)]
    pub secure_cookie: bool,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            lifetime_minutes: default_lifetime(),
            secure_cookie: false,
            max_sessions: default_max_sessions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Echo the new access token on the `/user` refresh-recovery path.
    #[serde(default)]
    pub expose_refreshed_token: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { format: default_log_format() }
    }
}

fn default_frontend_dir() -> String { "frontend".into() }
fn default_timeout() -> u64 { 10 }
fn default_cookie_name() -> String { "start_session".into() }
fn default_lifetime() -> u64 { 120 }
/// One year; moka rejects idle timeouts beyond 1000 years.
const MAX_LIFETIME_MINUTES: u64 = 525_600;
fn default_max_sessions() -> u64 { 100_000 }
fn default_log_format() -> String { "compact".into() }

fn config_path() -> String {
    std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string())
}

pub fn load_default() -> Result<AppConfig> {
    load_from_file(&config_path())
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Load `config.toml` when present, otherwise build from environment only.
    pub fn load_and_validate() -> Result<Self> {
        Self::load_and_validate_from(&config_path())
    }

    /// Only a missing file falls back to env; unreadable or malformed files are errors.
    pub fn load_and_validate_from(path: &str) -> Result<Self> {
        let mut cfg = match std::fs::read_to_string(path) {
            Ok(content) => parse(&content).with_context(|| format!("invalid config file {path}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                AppConfig { server: ServerConfig::from_env(), ..AppConfig::default() }
            }
            Err(e) => return Err(e).with_context(|| format!("cannot read config file {path}")),
        };
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        self.supabase.normalize_from_env();
        self.supabase.validate()?;
        self.session.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    /// Fallback bind address when no config file exists.
    pub fn from_env() -> Self {
        let host = std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("SERVER_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(8081);
        Self { host, port, frontend_dir: default_frontend_dir() }
    }

    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be in 1..=65535"));
        }
        if self.frontend_dir.trim().is_empty() {
            self.frontend_dir = default_frontend_dir();
        }
        Ok(())
    }
}

impl SupabaseConfig {
    pub fn normalize_from_env(&mut self) {
        // config.toml wins; env only fills gaps
        if self.url.trim().is_empty() {
            if let Ok(url) = std::env::var("SUPABASE_URL") {
                self.url = url;
            }
        }
        if self.key.trim().is_empty() {
            if let Ok(key) = std::env::var("SUPABASE_KEY") {
                self.key = key;
            }
        }
        self.url = self.url.trim().trim_end_matches('/').to_string();
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(anyhow!("supabase.url is empty; set it in config.toml or SUPABASE_URL"));
        }
        let lower = self.url.to_lowercase();
        if !(lower.starts_with("https://") || lower.starts_with("http://")) {
            return Err(anyhow!("supabase.url must start with http:// or https://"));
        }
        if self.key.trim().is_empty() {
            return Err(anyhow!("supabase.key is empty; set it in config.toml or SUPABASE_KEY"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("supabase.timeout_secs must be a positive number of seconds"));
        }
        Ok(())
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cookie_name.trim().is_empty() {
            return Err(anyhow!("session.cookie_name must not be empty"));
        }
        if self.lifetime_minutes == 0 {
            return Err(anyhow!("session.lifetime_minutes must be >= 1"));
        }
        if self.lifetime_minutes > MAX_LIFETIME_MINUTES {
            return Err(anyhow!("session.lifetime_minutes must be <= {MAX_LIFETIME_MINUTES}"));
        }
        if self.max_sessions == 0 {
            return Err(anyhow!("session.max_sessions must be >= 1"));
        }
        Ok(())
    }
}
