// PostgreSQL pool for the message store.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use tracing::{info, warn};

use super::migrations::run_migrations;

const DEFAULT_MIN_CONNECTIONS: u32 = 2;
const DEFAULT_MAX_CONNECTIONS: u32 = 20;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: DEFAULT_MIN_CONNECTIONS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Reads `CHATLINE_DB_MIN_CONNECTIONS`, `CHATLINE_DB_MAX_CONNECTIONS` and
    /// `CHATLINE_DB_ACQUIRE_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        fn parsed<T: std::str::FromStr>(raw: Result<String, std::env::VarError>) -> Option<T> {
            raw.ok().and_then(|value| value.trim().parse().ok())
        }

        let defaults = Self::default();
        let min_connections =
            parsed(env("CHATLINE_DB_MIN_CONNECTIONS")).unwrap_or(defaults.min_connections);
        let max_connections =
            parsed(env("CHATLINE_DB_MAX_CONNECTIONS")).unwrap_or(defaults.max_connections);
        let acquire_timeout = parsed(env("CHATLINE_DB_ACQUIRE_TIMEOUT_SECS"))
            .map(Duration::from_secs)
            .unwrap_or(defaults.acquire_timeout);

        Self {
            min_connections,
            max_connections: max_connections.max(min_connections),
            acquire_timeout,
        }
    }
}

/// Connects, verifies the connection and applies pending migrations.
pub async fn open_chat_database(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let connect_options = database_url
        .parse::<PgConnectOptions>()
        .context("failed to parse chat PostgreSQL connection options")?;
    ensure_transport_security(&connect_options)?;

    let pool = PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(connect_options)
        .await
        .context("failed to connect to chat PostgreSQL")?;

    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&pool)
        .await
        .context("chat PostgreSQL health check failed")?;
    run_migrations(&pool).await?;

    info!(
        min_connections = config.min_connections,
        max_connections = config.max_connections,
        "chat database ready"
    );
    Ok(pool)
}

/// Remote databases must use TLS. A database on the loopback interface may
/// skip it, which keeps a local docker postgres usable.
fn ensure_transport_security(options: &PgConnectOptions) -> Result<()> {
    match options.get_ssl_mode() {
        PgSslMode::Require | PgSslMode::VerifyCa | PgSslMode::VerifyFull => Ok(()),
        mode if is_loopback_host(options.get_host()) => {
            warn!(sslmode = ?mode, "chat PostgreSQL on loopback without required TLS");
            Ok(())
        }
        mode => bail!(
            "chat PostgreSQL connection must require TLS; got sslmode={mode:?}. Set sslmode=require (or stricter)."
        ),
    }
}

fn is_loopback_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1") || host.starts_with('/')
}
