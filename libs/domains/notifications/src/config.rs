//! Environment-driven configuration for the notifications pipeline.

use core_config::{ConfigError, Environment, FromEnv, env_flag, env_or_default, env_parse};
use job_queue::{DEFAULT_LEASE_MS, Retention, WorkerConfig};
use std::str::FromStr;
use std::time::Duration;

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain connection (local sinks such as Mailpit).
    None,
    /// Upgrade with STARTTLS.
    StartTls,
    /// Implicit TLS.
    Tls,
}

impl FromStr for SmtpSecurity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "plain" => Ok(SmtpSecurity::None),
            "starttls" => Ok(SmtpSecurity::StartTls),
            "tls" | "ssl" => Ok(SmtpSecurity::Tls),
            other => Err(format!("unknown SMTP security mode '{}'", other)),
        }
    }
}

/// SMTP transport configuration.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub security: SmtpSecurity,
    pub from_address: String,
    pub from_name: String,
    pub send_timeout: Duration,
    /// Route mail to a disposable local capture mailbox.
    pub debug: bool,
}

impl MailConfig {
    pub fn new(host: impl Into<String>, port: u16, from_address: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            security: SmtpSecurity::None,
            from_address: from_address.into(),
            from_name: "Estate".to_string(),
            send_timeout: Duration::from_secs(30),
            debug: false,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_security(mut self, security: SmtpSecurity) -> Self {
        self.security = security;
        self
    }

    pub fn with_from_name(mut self, from_name: impl Into<String>) -> Self {
        self.from_name = from_name.into();
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Debug capture is a development-only affordance.
    pub fn validate(&self, environment: Environment) -> Result<(), ConfigError> {
        if self.debug && environment.is_production() {
            return Err(ConfigError::Invalid(
                "MAIL_DEBUG must not be enabled in production".to_string(),
            ));
        }
        if self.from_address.trim().is_empty() {
            return Err(ConfigError::Invalid("EMAIL_FROM_ADDRESS is empty".to_string()));
        }
        Ok(())
    }
}

impl FromEnv for MailConfig {
    /// - SMTP_HOST: defaults to localhost
    /// - SMTP_PORT: defaults to 1025
    /// - SMTP_USERNAME / SMTP_PASSWORD: optional
    /// - SMTP_SECURITY: none | starttls | tls, defaults to none
    /// - EMAIL_FROM_ADDRESS: defaults to noreply@localhost
    /// - EMAIL_FROM_NAME: defaults to Estate
    /// - MAIL_SEND_TIMEOUT_MS: defaults to 30000
    /// - MAIL_DEBUG: defaults to false
    fn from_env() -> Result<Self, ConfigError> {
        let security = env_or_default("SMTP_SECURITY", "none")
            .parse()
            .map_err(|details| ConfigError::ParseError {
                key: "SMTP_SECURITY".to_string(),
                details,
            })?;

        Ok(Self {
            host: env_or_default("SMTP_HOST", "localhost"),
            port: env_parse("SMTP_PORT", 1025u16)?,
            username: std::env::var("SMTP_USERNAME").ok().filter(|v| !v.is_empty()),
            password: std::env::var("SMTP_PASSWORD").ok().filter(|v| !v.is_empty()),
            security,
            from_address: env_or_default("EMAIL_FROM_ADDRESS", "noreply@localhost"),
            from_name: env_or_default("EMAIL_FROM_NAME", "Estate"),
            send_timeout: Duration::from_millis(env_parse("MAIL_SEND_TIMEOUT_MS", 30_000u64)?),
            debug: env_flag("MAIL_DEBUG", false),
        })
    }
}

/// Notification queue settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: String,
    pub retention: Retention,
    /// How long a claimed job may run before it is treated as stalled
    pub lease_ms: u64,
    pub worker: WorkerConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "notifications".to_string(),
            retention: Retention::default(),
            lease_ms: DEFAULT_LEASE_MS,
            worker: WorkerConfig::default(),
        }
    }
}

impl FromEnv for QueueConfig {
    /// - NOTIFICATION_QUEUE_NAME: defaults to notifications
    /// - QUEUE_KEEP_COMPLETED: defaults to 100
    /// - QUEUE_KEEP_FAILED: defaults to 50
    /// - QUEUE_JOB_LEASE_MS: defaults to 300000
    /// - plus the worker's QUEUE_CONCURRENCY / QUEUE_POLL_INTERVAL_MS / QUEUE_STALLED_CHECK_INTERVAL_MS
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Retention::default();
        Ok(Self {
            name: env_or_default("NOTIFICATION_QUEUE_NAME", "notifications"),
            retention: Retention {
                keep_completed: env_parse("QUEUE_KEEP_COMPLETED", defaults.keep_completed)?,
                keep_failed: env_parse("QUEUE_KEEP_FAILED", defaults.keep_failed)?,
            },
            lease_ms: env_parse("QUEUE_JOB_LEASE_MS", DEFAULT_LEASE_MS)?,
            worker: WorkerConfig::from_env()?,
        })
    }
}

/// Branding and links merged into every feature sender's template context.
#[derive(Debug, Clone)]
pub struct NotificationServiceConfig {
    pub app_name: String,
    pub frontend_url: String,
    pub support_email: String,
    pub company_address: Option<String>,
}

impl Default for NotificationServiceConfig {
    fn default() -> Self {
        Self {
            app_name: "Estate".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            support_email: "support@localhost".to_string(),
            company_address: None,
        }
    }
}

impl NotificationServiceConfig {
    /// Absolute frontend link for `path`.
    pub fn link(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.frontend_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl FromEnv for NotificationServiceConfig {
    /// - APP_NAME, FRONTEND_URL, SUPPORT_EMAIL: have local defaults
    /// - COMPANY_ADDRESS: optional
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            app_name: env_or_default("APP_NAME", &defaults.app_name),
            frontend_url: env_or_default("FRONTEND_URL", &defaults.frontend_url),
            support_email: env_or_default("SUPPORT_EMAIL", &defaults.support_email),
            company_address: std::env::var("COMPANY_ADDRESS").ok().filter(|v| !v.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mail_config_defaults() {
        temp_env::with_vars(
            [
                ("SMTP_HOST", None::<&str>),
                ("SMTP_PORT", None),
                ("SMTP_SECURITY", None),
                ("SMTP_USERNAME", None),
                ("MAIL_DEBUG", None),
                ("MAIL_SEND_TIMEOUT_MS", None),
            ],
            || {
                let config = MailConfig::from_env().unwrap();
                assert_eq!(config.host, "localhost");
                assert_eq!(config.port, 1025);
                assert_eq!(config.security, SmtpSecurity::None);
                assert_eq!(config.username, None);
                assert_eq!(config.send_timeout, Duration::from_secs(30));
                assert!(!config.debug);
            },
        );
    }

    #[test]
    fn test_mail_config_custom() {
        temp_env::with_vars(
            [
                ("SMTP_HOST", Some("smtp.example.com")),
                ("SMTP_PORT", Some("587")),
                ("SMTP_SECURITY", Some("STARTTLS")),
                ("SMTP_USERNAME", Some("mailer")),
                ("SMTP_PASSWORD", Some("secret")),
                ("MAIL_SEND_TIMEOUT_MS", Some("5000")),
            ],
            || {
                let config = MailConfig::from_env().unwrap();
                assert_eq!(config.port, 587);
                assert_eq!(config.security, SmtpSecurity::StartTls);
                assert_eq!(config.username.as_deref(), Some("mailer"));
                assert_eq!(config.send_timeout, Duration::from_millis(5000));
            },
        );
    }

    #[test]
    fn test_mail_config_rejects_unknown_security() {
        temp_env::with_var("SMTP_SECURITY", Some("carrier-pigeon"), || {
            let err = MailConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("SMTP_SECURITY"));
        });
    }

    #[test]
    fn test_debug_mail_rejected_in_production() {
        let config = MailConfig::new("localhost", 1025, "noreply@example.com").with_debug(true);
        assert!(config.validate(Environment::Development).is_ok());
        assert!(config.validate(Environment::Production).is_err());
    }

    #[test]
    fn test_queue_config_from_env() {
        temp_env::with_vars(
            [
                ("NOTIFICATION_QUEUE_NAME", Some("mail")),
                ("QUEUE_KEEP_COMPLETED", Some("10")),
                ("QUEUE_KEEP_FAILED", None),
                ("QUEUE_CONCURRENCY", Some("8")),
                ("QUEUE_JOB_LEASE_MS", Some("60000")),
            ],
            || {
                let config = QueueConfig::from_env().unwrap();
                assert_eq!(config.name, "mail");
                assert_eq!(config.lease_ms, 60_000);
                assert_eq!(config.retention.keep_completed, 10);
                assert_eq!(config.retention.keep_failed, 50);
                assert_eq!(config.worker.concurrency, 8);
            },
        );
    }

    #[test]
    fn test_service_config_link() {
        let config = NotificationServiceConfig {
            frontend_url: "https://app.example.com/".into(),
            ..Default::default()
        };
        assert_eq!(config.link("/leases/42"), "https://app.example.com/leases/42");
    }
}
