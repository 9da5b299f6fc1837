use crate::{env_or_default, env_parse, ConfigError, FromEnv};
use std::net::Ipv4Addr;

/// Bind address for the worker's admin/health HTTP server.
#[derive(Clone, Debug)]
pub struct AdminServerConfig {
    pub host: String,
    pub port: u16,
}

impl AdminServerConfig {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromEnv for AdminServerConfig {
    /// - ADMIN_HOST: defaults to 0.0.0.0
    /// - ADMIN_PORT: defaults to 8082
    fn from_env() -> Result<Self, ConfigError> {
        let host = env_or_default("ADMIN_HOST", &Ipv4Addr::UNSPECIFIED.to_string());
        let port = env_parse("ADMIN_PORT", 8082u16)?;

        Ok(Self { host, port })
    }
}

impl Default for AdminServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::UNSPECIFIED.to_string(),
            port: 8082,
        }
    }
}
