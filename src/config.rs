use std::env;
use std::num::NonZeroU32;

use anyhow::{Context, bail};

/// Shortest HMAC secret we accept for signing session tokens.
pub const MIN_SECRET_LEN: usize = 32;

/// Sessions are never longer than this; tokens carry no revocation list.
pub const MAX_SESSION_TTL_HOURS: i64 = 24;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreConfig {
    Postgres { url: String, max_connections: u32 },
    Memory,
}

#[derive(Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub bind_addr: String,
    pub jwt_secret: Vec<u8>,
    pub session_ttl_hours: i64,
    pub cors_allowed_origins: Vec<String>,
}

// The secret must never end up in logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("store", &self.store)
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"<redacted>")
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup. `from_env` feeds it the process
    /// environment; tests feed it a map.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;
        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(s) => s
                .trim()
                .parse::<NonZeroU32>()
                .context("DB_MAX_CONNECTIONS must be a positive integer")?
                .get(),
            None => 10,
        };
        let store = if database_url.trim() == "memory://" {
            StoreConfig::Memory
        } else {
            StoreConfig::Postgres {
                url: database_url,
                max_connections,
            }
        };

        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} bytes");
        }

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());

        let session_ttl_hours = match lookup("SESSION_TTL_HOURS") {
            Some(s) => s
                .parse::<i64>()
                .context("SESSION_TTL_HOURS must be an integer")?,
            None => MAX_SESSION_TTL_HOURS,
        };
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&session_ttl_hours) {
            bail!("SESSION_TTL_HOURS must be between 1 and {MAX_SESSION_TTL_HOURS}");
        }

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            store,
            bind_addr,
            jwt_secret: jwt_secret.into_bytes(),
            session_ttl_hours,
            cors_allowed_origins,
        })
    }
}
