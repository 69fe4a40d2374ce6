//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The configuration file path defaults to `config.yaml` but can be
//! specified via `-f` flag or `BATTLECTL_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources
//! override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `BATTLECTL_` override YAML values
//! 3. **DATABASE_URL** - Special case: overrides `database.url` if set
//!
//! For nested config values, use double underscores in environment variables.
//! For example, `BATTLECTL_TWITCH__ENABLED=true` sets the `twitch.enabled`
//! field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use battlectl::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "BATTLECTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment
/// variables. All fields have sensible defaults defined in the `Default`
/// implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Base URL where the site is accessible (e.g., "https://battles.example.com").
    /// Used for the accept/reject links embedded in admin notification emails.
    pub base_url: String,
    /// Deprecated: Use `database.url` instead. Kept so DATABASE_URL keeps working.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// PostgreSQL connection settings
    pub database: DatabaseConfig,
    /// Email address that receives new battle request notifications
    pub admin_email: String,
    /// Static key required in the `x-admin-key` header for admin endpoints.
    /// Admin endpoints reject every request while this is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_api_key: Option<String>,
    /// Email transport and sender identity
    pub email: EmailConfig,
    /// Twitch live-status integration
    pub twitch: TwitchConfig,
    /// Notification outbox configuration
    pub notifications: NotificationsConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            database_url: None,
            database: DatabaseConfig::default(),
            admin_email: String::new(),
            admin_api_key: None,
            email: EmailConfig::default(),
            twitch: TwitchConfig::default(),
            notifications: NotificationsConfig::default(),
            cors: CorsConfig::default(),
            enable_metrics: false,
        }
    }
}

/// Individual pool configuration with all SQLx parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
    /// Time before idle connections are closed (seconds, 0 = never)
    pub idle_timeout_secs: u64,
    /// Maximum lifetime of a connection (seconds, 0 = never)
    pub max_lifetime_secs: u64,
}

impl Default for PoolSettings {
    /// Production defaults: balanced for reliability and resource usage
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,  // 10 minutes
            max_lifetime_secs: 1800, // 30 minutes
        }
    }
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection string for the database
    pub url: String,
    /// Connection pool settings
    pub pool: PoolSettings,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/battlectl".to_string(),
            pool: PoolSettings::default(),
        }
    }
}

/// Email configuration for request and status notifications.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
// Note: Cannot use deny_unknown_fields here due to #[serde(flatten)] on transport
pub struct EmailConfig {
    /// Email transport method
    #[serde(flatten)]
    pub transport: EmailTransportConfig,
    /// Sender email address
    pub from_email: String,
    /// Sender display name
    pub from_name: String,
    /// Who to set the reply to field from
    pub reply_to: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            transport: EmailTransportConfig::default(),
            from_email: "noreply@example.com".to_string(),
            from_name: "Battle Requests".to_string(),
            reply_to: None,
        }
    }
}

/// Email transport configuration - either SMTP or file-based for testing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmailTransportConfig {
    /// Send emails via SMTP server
    Smtp {
        /// SMTP server hostname
        host: String,
        /// SMTP server port
        port: u16,
        /// SMTP authentication username
        username: String,
        /// SMTP authentication password
        password: String,
        /// Use TLS encryption
        use_tls: bool,
    },
    /// Write emails to files (for development/testing)
    File {
        /// Directory path where email files will be written
        path: String,
    },
}

impl Default for EmailTransportConfig {
    fn default() -> Self {
        Self::File {
            path: "./emails".to_string(),
        }
    }
}

/// Twitch Helix integration for the channel live-status endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TwitchConfig {
    /// Enable the Twitch status endpoint. When disabled the endpoint reports
    /// the integration as unconfigured.
    pub enabled: bool,
    /// Twitch application client id
    pub client_id: String,
    /// Twitch application client secret
    pub client_secret: String,
    /// Channel login the booking form belongs to; used as the default lookup
    /// and for the channel links in outgoing emails.
    pub channel_name: String,
    /// OAuth token endpoint (overridable for tests)
    pub auth_url: Url,
    /// Helix API base URL (overridable for tests)
    pub api_base_url: Url,
    /// How long before expiry an app access token is refreshed
    #[serde(with = "humantime_serde")]
    pub token_refresh_margin: Duration,
    /// Timeout for outbound Twitch API calls
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id: String::new(),
            client_secret: String::new(),
            channel_name: String::new(),
            auth_url: Url::parse("https://id.twitch.tv/oauth2/token").unwrap(),
            api_base_url: Url::parse("https://api.twitch.tv/helix").unwrap(),
            token_refresh_margin: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Notification outbox configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationsConfig {
    /// Capacity of the in-process outbox channel. Events enqueued while the
    /// channel is full are dropped and logged.
    pub channel_capacity: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { channel_capacity: 64 }
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                CorsOrigin::Url(Url::parse("http://localhost:5173").unwrap()), // Development frontend (Vite)
            ],
            allow_credentials: false,
            max_age: Some(3600), // Cache preflight for 1 hour
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://battles.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" { Ok(()) } else { Err(serde::de::Error::custom("Expected '*'")) }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // if database_url is set, use it (preserving existing pool settings)
        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("BATTLECTL_").split("__"))
            // Common DATABASE_URL pattern
            .merge(Env::raw().only(&["DATABASE_URL"]))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.base_url.is_empty() || Url::parse(&self.base_url).is_err() {
            return Err(Error::Internal {
                operation: "Config validation: base_url must be a valid URL. It is embedded in the accept/reject email links."
                    .to_string(),
            });
        }

        if !self.admin_email.contains('@') {
            return Err(Error::Internal {
                operation: "Config validation: admin_email must be set to a valid address. \
                     New battle request notifications are sent there."
                    .to_string(),
            });
        }

        if !self.email.from_email.contains('@') {
            return Err(Error::Internal {
                operation: "Config validation: email.from_email must be a valid address".to_string(),
            });
        }

        if self.notifications.channel_capacity == 0 {
            return Err(Error::Internal {
                operation: "Config validation: notifications.channel_capacity cannot be 0 (recommended: 64)".to_string(),
            });
        }

        if self.twitch.enabled {
            if self.twitch.client_id.is_empty() || self.twitch.client_secret.is_empty() {
                return Err(Error::Internal {
                    operation: "Config validation: Twitch integration is enabled but client_id or client_secret is not configured. \
                     Set BATTLECTL_TWITCH__CLIENT_ID and BATTLECTL_TWITCH__CLIENT_SECRET or add them to the config file."
                        .to_string(),
                });
            }
            if self.twitch.channel_name.is_empty() {
                return Err(Error::Internal {
                    operation: "Config validation: Twitch integration is enabled but channel_name is not configured".to_string(),
                });
            }
        }

        // Validate CORS configuration
        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        // Validate that wildcard is not used with credentials
        let has_wildcard = self.cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allow_credentials {
            return Err(Error::Internal {
                operation: "Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins."
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_load_from_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
host: 127.0.0.1
port: 9000
base_url: https://battles.example.com
admin_email: streamer@example.com
database:
  url: postgres://db.internal:5432/battles
twitch:
  enabled: true
  client_id: abc
  client_secret: shhh
  channel_name: pelletion
"#,
            )?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };
            let config = Config::load(&args).expect("config should load");

            assert_eq!(config.port, 9000);
            assert_eq!(config.bind_address(), "127.0.0.1:9000");
            assert_eq!(config.database.url, "postgres://db.internal:5432/battles");
            assert!(config.twitch.enabled);
            assert_eq!(config.twitch.channel_name, "pelletion");
            Ok(())
        });
    }

    #[test]
    fn test_database_url_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
admin_email: streamer@example.com
database:
  url: postgres://from-yaml:5432/battles
"#,
            )?;
            jail.set_env("DATABASE_URL", "postgres://from-env:5432/battles");

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };
            let config = Config::load(&args).expect("config should load");

            assert_eq!(config.database.url, "postgres://from-env:5432/battles");
            Ok(())
        });
    }

    #[test]
    fn test_nested_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "admin_email: streamer@example.com\n")?;
            jail.set_env("BATTLECTL_NOTIFICATIONS__CHANNEL_CAPACITY", "128");

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };
            let config = Config::load(&args).expect("config should load");

            assert_eq!(config.notifications.channel_capacity, 128);
            Ok(())
        });
    }

    #[test]
    fn test_missing_admin_email_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "port: 9000\n")?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };
            assert!(Config::load(&args).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_twitch_enabled_requires_credentials() {
        let config = Config {
            admin_email: "streamer@example.com".to_string(),
            twitch: TwitchConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wildcard_origin_with_credentials_is_rejected() {
        let config = Config {
            admin_email: "streamer@example.com".to_string(),
            cors: CorsConfig {
                allowed_origins: vec![CorsOrigin::Wildcard],
                allow_credentials: true,
                max_age: None,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cors_origin_parses_wildcard_and_urls() {
        let origins: Vec<CorsOrigin> = serde_json::from_str(r#"["*", "https://battles.example.com"]"#).unwrap();
        assert!(matches!(origins[0], CorsOrigin::Wildcard));
        assert!(matches!(origins[1], CorsOrigin::Url(_)));
    }
}
