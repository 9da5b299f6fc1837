use crate::{env_parse, env_required, ConfigError, FromEnv};

/// Postgres settings for the template store.
///
/// The store only does point reads and occasional upserts, so the pool stays small.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn new(url: String) -> Self {
        Self {
            url,
            max_connections: 5,
            connect_timeout_ms: 5_000,
        }
    }
}

impl FromEnv for DatabaseConfig {
    /// - DATABASE_URL: required
    /// - DATABASE_MAX_CONNECTIONS: defaults to 5
    /// - DATABASE_CONNECT_TIMEOUT_MS: defaults to 5000
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::new(env_required("DATABASE_URL")?);
        Ok(Self {
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", defaults.max_connections)?,
            connect_timeout_ms: env_parse("DATABASE_CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms)?,
            ..defaults
        })
    }
}
