use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides `auth.jwt_secret`
pub const JWT_SECRET_ENV: &str = "PERFTRACK_JWT_SECRET";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server address (e.g., "0.0.0.0:8080")
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Deployment environment: "development" or "production"
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Directory holding the pre-built dashboard bundle
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Origins allowed to call the API with credentials (empty disables CORS)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Token and cookie configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database host
    #[serde(default = "default_db_host")]
    pub host: String,
    /// Database port
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Database name
    #[serde(default = "default_db_name", rename = "database")]
    pub name: String,
    /// Database user
    #[serde(default = "default_db_user", rename = "username")]
    pub user: String,
    /// Database password
    #[serde(default)]
    pub password: String,
    /// Upper bound of the connection pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign access and refresh tokens
    #[serde(default)]
    pub jwt_secret: String,
    /// Token issuer (`iss` claim)
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Access token lifetime in seconds
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: i64,
    /// Refresh token lifetime in seconds
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: i64,
    /// Mark auth cookies `Secure` (enable behind HTTPS)
    #[serde(default)]
    pub cookie_secure: bool,
}

// Default value functions
fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("webapp/dist")
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "perftrack".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_issuer() -> String {
    "perftrack".to_string()
}

fn default_access_ttl() -> i64 {
    15 * 60
}

fn default_refresh_ttl() -> i64 {
    7 * 24 * 60 * 60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            environment: default_environment(),
            static_dir: default_static_dir(),
            cors_origins: Vec::new(),
            log: LogConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            name: default_db_name(),
            user: default_db_user(),
            password: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: default_issuer(),
            access_token_ttl_secs: default_access_ttl(),
            refresh_token_ttl_secs: default_refresh_ttl(),
            cookie_secure: false,
        }
    }
}

impl DatabaseConfig {
    /// Generate database connection URL
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
            if !secret.is_empty() {
                self.auth.jwt_secret = secret;
            }
        }
    }

    /// Outside production an empty secret is replaced by a random one for this
    /// process. Returns true when that happened; sessions then end on restart.
    pub fn ensure_jwt_secret(&mut self) -> bool {
        if self.is_production() || !self.auth.jwt_secret.is_empty() {
            return false;
        }
        self.auth.jwt_secret = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        true
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Check settings that would make the auth flow unsafe or unusable
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.auth.access_token_ttl_secs <= 0 || self.auth.refresh_token_ttl_secs <= 0 {
            anyhow::bail!("token lifetimes must be positive");
        }
        if self.auth.refresh_token_ttl_secs <= self.auth.access_token_ttl_secs {
            anyhow::bail!("refresh_token_ttl_secs must exceed access_token_ttl_secs");
        }
        if self.is_production() && self.auth.jwt_secret.len() < 32 {
            anyhow::bail!(
                "auth.jwt_secret (or {}) must be at least 32 bytes in production",
                JWT_SECRET_ENV
            );
        }
        Ok(())
    }
}
