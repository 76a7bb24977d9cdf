//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub oauth: OAuthConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
    /// Public host, including a non-default port (e.g., "localhost:3000")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the public base URL
    ///
    /// # Returns
    /// Full URL like "https://dash.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }

    /// URL the OAuth provider redirects back to after authorization
    pub fn callback_url(&self) -> String {
        format!("{}/callback", self.base_url())
    }
}

/// Which backend holds session records
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    Memory,
    Redis,
}

/// Session cookie and storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Cookie signing secret (32+ bytes)
    pub secret: String,
    /// Name of the signed session-id cookie
    pub cookie_name: String,
    /// Record lifetime in the store
    pub ttl_seconds: u64,
    #[serde(default)]
    pub backend: SessionBackend,
    /// Redis connection URL (required when backend = redis)
    pub redis_url: Option<String>,
    /// Prefix prepended to session ids to form store keys
    pub key_prefix: String,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// OAuth 1.0a consumer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub request_token_url: String,
    pub access_token_url: String,
    pub authorize_url: String,
}

/// Dashboard API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Dashboard endpoint (e.g., "https://api.tumblr.com/v2/user/dashboard")
    pub api_url: String,
    /// Seconds between polls on a streaming connection
    pub poll_interval_seconds: u64,
    /// Per-request timeout for provider and API calls
    pub request_timeout_seconds: u64,
}

impl DashboardConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (DASHFEED__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.domain", "localhost:3000")?
            .set_default("server.protocol", "http")?
            .set_default("session.cookie_name", "connect.sid")?
            .set_default("session.ttl_seconds", 86400)?
            .set_default("session.backend", "memory")?
            .set_default("session.key_prefix", "sess:")?
            .set_default(
                "oauth.request_token_url",
                "https://www.tumblr.com/oauth/request_token",
            )?
            .set_default(
                "oauth.access_token_url",
                "https://www.tumblr.com/oauth/access_token",
            )?
            .set_default("oauth.authorize_url", "https://www.tumblr.com/oauth/authorize")?
            .set_default("dashboard.api_url", "https://api.tumblr.com/v2/user/dashboard")?
            .set_default("dashboard.poll_interval_seconds", 5)?
            .set_default("dashboard.request_timeout_seconds", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("DASHFEED")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.session.secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "session.secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.session.ttl_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "session.ttl_seconds must be greater than 0".to_string(),
            ));
        }

        if self.session.backend == SessionBackend::Redis
            && self
                .session
                .redis_url
                .as_deref()
                .map(str::trim)
                .is_none_or(str::is_empty)
        {
            return Err(crate::error::AppError::Config(
                "session.redis_url is required when session.backend=redis".to_string(),
            ));
        }

        if self.oauth.consumer_key.trim().is_empty() || self.oauth.consumer_secret.trim().is_empty()
        {
            return Err(crate::error::AppError::Config(
                "oauth.consumer_key and oauth.consumer_secret must not be empty".to_string(),
            ));
        }

        if self.dashboard.poll_interval_seconds == 0 {
            tracing::warn!("dashboard.poll_interval_seconds=0 is invalid; clamped to 1 second");
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_matches(|c| c == '[' || c == ']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
