// Hub server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The DB pool reads its own tuning variables in db/pool.rs.

use std::{net::SocketAddr, path::PathBuf};

pub(crate) const DEV_JWT_SECRET: &str = "chatline_local_development_jwt_secret_32_chars";

/// Core hub server configuration.
///
/// Constructed via [`HubConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// HMAC secret for access tokens presented at the WebSocket handshake.
    pub jwt_secret: String,
    /// Separate HMAC secret for collaborator hook tokens. `None` disables `/v1/hooks`.
    pub hook_secret: Option<String>,
    /// PostgreSQL connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// JSON fixture of users and channels loaded into the in-memory store.
    pub seed_path: Option<PathBuf>,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `chatline_hub=debug`).
    pub log_filter: String,
}

impl HubConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `CHATLINE_HOST` | `0.0.0.0` |
    /// | `CHATLINE_PORT` | `3001` |
    /// | `CHATLINE_JWT_SECRET` | dev-only placeholder |
    /// | `CHATLINE_HOOK_SECRET` | *(none, hooks disabled)* |
    /// | `CHATLINE_DATABASE_URL` | *(none, in-memory store)* |
    /// | `CHATLINE_SEED_FILE` | *(none)* |
    /// | `CHATLINE_CORS_ORIGINS` | *(none, cors.rs uses dev defaults)* |
    /// | `CHATLINE_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("CHATLINE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("CHATLINE_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(3001);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let jwt_secret = env("CHATLINE_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.into());
        let hook_secret = env("CHATLINE_HOOK_SECRET").ok().filter(|secret| !secret.trim().is_empty());
        let database_url = env("CHATLINE_DATABASE_URL").ok().filter(|url| !url.trim().is_empty());
        let seed_path = env("CHATLINE_SEED_FILE")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        let cors_origins = env("CHATLINE_CORS_ORIGINS").ok();
        let log_filter = env("CHATLINE_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Self { listen_addr, jwt_secret, hook_secret, database_url, seed_path, cors_origins, log_filter }
    }

    /// Hook tokens must not verify with the user key, so the secrets must differ.
    pub fn validate_secrets(&self) -> anyhow::Result<()> {
        if self.hook_secret.as_deref() == Some(self.jwt_secret.as_str()) {
            anyhow::bail!("CHATLINE_HOOK_SECRET must differ from CHATLINE_JWT_SECRET");
        }
        Ok(())
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}
