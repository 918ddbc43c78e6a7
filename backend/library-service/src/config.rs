//! Service configuration
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults (`config/defaults.toml`)
//! 2. `<config dir>/library.toml`
//! 3. `<config dir>/library.<environment>.toml`
//! 4. `LIBRARY_<SECTION>__<KEY>` environment variables
//!
//! The environment comes from `APP_ENV` and the directory from
//! `LIBRARY_CONFIG_DIR` (default `config`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crypto_core::secret::{is_well_known, validate_secret_strength, SecretStrength};
use crypto_core::TokenConfig;
use rbac::{RbacError, RbacKind};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use validator::{Validate, ValidationError};

const DEFAULTS: &str = include_str!("../config/defaults.toml");

const ENV_PREFIX: &str = "LIBRARY";
const CONFIG_DIR_VAR: &str = "LIBRARY_CONFIG_DIR";
const ENVIRONMENT_VAR: &str = "APP_ENV";

const MIN_SHUTDOWN_GRACE: Duration = Duration::from_secs(15);
const MAX_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    Production(&'static str),

    #[error("invalid server address: {0}")]
    Address(String),

    #[error(transparent)]
    Rbac(#[from] RbacError),
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "loc" => Ok(Environment::Local),
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" | "stg" => Ok(Environment::Staging),
            "production" | "prod" | "prd" => Ok(Environment::Production),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,

    #[validate(nested)]
    pub server: ServerSettings,

    #[validate(nested)]
    pub auth: AuthSettings,

    #[validate(nested)]
    pub pagination: PaginationSettings,

    #[serde(default)]
    #[validate(nested)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ServerSettings {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1))]
    pub port: u16,

    #[validate(range(min = 1, max = 3600))]
    pub request_timeout_secs: u64,

    /// Clamped to 15..=30 seconds
    pub shutdown_grace_period_secs: u64,
}

impl ServerSettings {
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::Address(format!("{}:{}", self.host, self.port)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_secs)
            .clamp(MIN_SHUTDOWN_GRACE, MAX_SHUTDOWN_GRACE)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_token_lifetimes"))]
pub struct AuthSettings {
    /// HS256 signing secret; required in production
    #[serde(default)]
    pub jwt_secret: Option<SecretString>,

    /// Falls back to `jwt_secret`
    #[serde(default)]
    pub refresh_secret: Option<SecretString>,

    #[validate(length(min = 1))]
    pub issuer: String,

    /// Seconds
    #[validate(range(min = 60))]
    pub access_token_duration: u64,

    /// Seconds
    pub refresh_token_duration: u64,

    #[serde(default)]
    pub rbac_type: String,

    #[serde(default)]
    pub rbac_model_path: Option<PathBuf>,

    #[serde(default)]
    pub rbac_policy_path: Option<PathBuf>,
}

fn validate_token_lifetimes(auth: &AuthSettings) -> Result<(), ValidationError> {
    if auth.refresh_token_duration < auth.access_token_duration {
        return Err(ValidationError::new("refresh_shorter_than_access"));
    }
    Ok(())
}

fn non_empty(secret: &Option<SecretString>) -> Option<&str> {
    secret
        .as_ref()
        .map(|s| s.expose_secret())
        .filter(|s| !s.trim().is_empty())
}

impl AuthSettings {
    pub fn rbac_kind(&self) -> Result<RbacKind, ConfigError> {
        Ok(self.rbac_type.parse::<RbacKind>()?)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_page_sizes"))]
pub struct PaginationSettings {
    /// 256-bit key material; shorter keys are zero-padded, longer truncated
    #[serde(default)]
    pub cursor_encryption_key: Option<SecretString>,

    #[validate(range(min = 1))]
    pub default_page_size: u32,

    #[validate(range(min = 1, max = 10000))]
    pub max_page_size: u32,

    /// Seconds a page token stays valid
    #[validate(range(min = 60))]
    pub cursor_expiration: u64,
}

fn validate_page_sizes(pagination: &PaginationSettings) -> Result<(), ValidationError> {
    if pagination.default_page_size > pagination.max_page_size {
        return Err(ValidationError::new("default_page_size_exceeds_max"));
    }
    Ok(())
}

impl PaginationSettings {
    pub fn limits(&self) -> PageLimits {
        PageLimits {
            default_size: self.default_page_size,
            max_size: self.max_page_size,
        }
    }

    pub fn cursor_ttl(&self) -> Duration {
        Duration::from_secs(self.cursor_expiration)
    }
}

/// Page-size policy for list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_size: u32,
    pub max_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_size: 50,
            max_size: 200,
        }
    }
}

impl PageLimits {
    /// Default for zero or negative requests, capped at the maximum
    pub fn resolve(&self, requested: i32) -> u32 {
        match u32::try_from(requested) {
            Ok(0) | Err(_) => self.default_size,
            Ok(size) => size.min(self.max_size),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct DatabaseSettings {
    /// No URL selects the in-memory adapters
    #[serde(default)]
    pub url: Option<SecretString>,

    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1, max = 200))]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout_secs")]
    #[validate(range(min = 1))]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl DatabaseSettings {
    pub fn url(&self) -> Option<&str> {
        non_empty(&self.url)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub format: LogFormat,
}

impl Settings {
    /// Load from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let environment = match std::env::var(ENVIRONMENT_VAR) {
            Ok(value) => value.parse()?,
            Err(_) => Environment::default(),
        };
        let dir = std::env::var(CONFIG_DIR_VAR).unwrap_or_else(|_| "config".to_string());

        Self::load_from(Path::new(&dir), environment)
    }

    /// Load with an explicit config directory and environment
    pub fn load_from(dir: &Path, environment: Environment) -> Result<Self, ConfigError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(DEFAULTS, config::FileFormat::Toml))
            .add_source(config::File::from(dir.join("library.toml")).required(false))
            .add_source(
                config::File::from(dir.join(format!("library.{}.toml", environment.as_str())))
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override("environment", environment.as_str())?
            .build()?
            .try_deserialize()?;

        settings.check()?;
        Ok(settings)
    }

    /// Field rules plus the production-only requirements
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        self.auth.rbac_kind()?;

        if self.environment.is_production() {
            let secret = non_empty(&self.auth.jwt_secret)
                .ok_or(ConfigError::Production("auth.jwt_secret is required in production"))?;
            if is_weak(secret) {
                return Err(ConfigError::Production(
                    "auth.jwt_secret is too weak for production",
                ));
            }
            if let Some(refresh) = non_empty(&self.auth.refresh_secret) {
                if is_weak(refresh) {
                    return Err(ConfigError::Production(
                        "auth.refresh_secret is too weak for production",
                    ));
                }
            }
            if non_empty(&self.pagination.cursor_encryption_key).is_none() {
                return Err(ConfigError::Production(
                    "pagination.cursor_encryption_key is required in production",
                ));
            }
        }
        Ok(())
    }

    /// Signing configuration; outside production a missing secret is
    /// replaced with an ephemeral one
    pub fn token_config(&self) -> Result<TokenConfig, ConfigError> {
        let access_secret = match non_empty(&self.auth.jwt_secret) {
            Some(secret) => secret.as_bytes().to_vec(),
            None if self.environment.is_production() => {
                return Err(ConfigError::Production(
                    "auth.jwt_secret is required in production",
                ))
            }
            None => crypto_core::jwt::generate_secret(),
        };
        let refresh_secret = non_empty(&self.auth.refresh_secret)
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_else(|| access_secret.clone());

        Ok(TokenConfig {
            access_secret,
            refresh_secret,
            issuer: self.auth.issuer.clone(),
            access_ttl: Duration::from_secs(self.auth.access_token_duration),
            refresh_ttl: Duration::from_secs(self.auth.refresh_token_duration),
        })
    }

    /// Cursor key material; outside production a missing key is random
    pub fn cursor_key(&self) -> Result<Vec<u8>, ConfigError> {
        match non_empty(&self.pagination.cursor_encryption_key) {
            Some(key) => Ok(key.as_bytes().to_vec()),
            None if self.environment.is_production() => Err(ConfigError::Production(
                "pagination.cursor_encryption_key is required in production",
            )),
            None => {
                warn!("No cursor encryption key configured; page tokens will not survive a restart");
                Ok(rand::random::<[u8; crypto_core::cursor::KEY_LEN]>().to_vec())
            }
        }
    }
}

fn is_weak(secret: &str) -> bool {
    is_well_known(secret.as_bytes())
        || validate_secret_strength(secret.as_bytes()) == SecretStrength::Weak
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const STRONG_SECRET: &str = "q8Vz3Lk1Rt7Wm2Np9Xc4Bs6Hf0Jd5Ga8Ye1Ku3Oi7Pl";

    fn load(files: &[(&str, &str)], environment: Environment) -> Result<Settings, ConfigError> {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            fs::write(dir.path().join(name), contents).unwrap();
        }
        Settings::load_from(dir.path(), environment)
    }

    #[test]
    fn test_defaults_only() {
        let settings = load(&[], Environment::Development).unwrap();

        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.pagination.limits(), PageLimits::default());
        assert_eq!(settings.pagination.cursor_ttl(), Duration::from_secs(86400));
        assert_eq!(settings.auth.rbac_kind().unwrap(), RbacKind::Builtin);
        assert!(settings.database.url().is_none());
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_environment_file_overrides_base() {
        let settings = load(
            &[
                ("library.toml", "[server]\nport = 7000\n[logging]\nformat = \"pretty\"\n"),
                ("library.staging.toml", "[server]\nport = 7100\n"),
            ],
            Environment::Staging,
        )
        .unwrap();

        assert_eq!(settings.server.port, 7100);
        assert_eq!(settings.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_production_requires_secret() {
        let err = load(&[], Environment::Production).unwrap_err();
        assert!(matches!(err, ConfigError::Production(_)));
    }

    #[test]
    fn test_production_rejects_weak_secret() {
        let err = load(
            &[(
                "library.production.toml",
                "[auth]\njwt_secret = \"changeme\"\n[pagination]\ncursor_encryption_key = \"k\"\n",
            )],
            Environment::Production,
        )
        .unwrap_err();
        assert!(err.to_string().contains("too weak"));
    }

    #[test]
    fn test_production_with_strong_secret() {
        let contents = format!(
            "[auth]\njwt_secret = \"{STRONG_SECRET}\"\n[pagination]\ncursor_encryption_key = \"{STRONG_SECRET}\"\n"
        );
        let settings = load(
            &[("library.production.toml", contents.as_str())],
            Environment::Production,
        )
        .unwrap();

        let tokens = settings.token_config().unwrap();
        assert_eq!(tokens.access_secret, STRONG_SECRET.as_bytes());
        assert_eq!(tokens.refresh_secret, tokens.access_secret);
        assert_eq!(tokens.access_ttl, Duration::from_secs(900));
    }

    #[test]
    fn test_refresh_shorter_than_access_rejected() {
        let err = load(
            &[(
                "library.toml",
                "[auth]\naccess_token_duration = 3600\nrefresh_token_duration = 60\n",
            )],
            Environment::Development,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_unknown_rbac_type_rejected() {
        let err = load(
            &[("library.toml", "[auth]\nrbac_type = \"casbin\"\n")],
            Environment::Development,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Rbac(_)));
    }

    #[test]
    fn test_development_generates_missing_keys() {
        let settings = load(&[], Environment::Development).unwrap();
        assert_eq!(settings.token_config().unwrap().access_secret.len(), 32);
        assert_eq!(settings.cursor_key().unwrap().len(), 32);
    }

    #[test]
    fn test_shutdown_grace_period_clamped() {
        let settings = load(
            &[("library.toml", "[server]\nshutdown_grace_period_secs = 120\n")],
            Environment::Development,
        )
        .unwrap();
        assert_eq!(settings.server.shutdown_grace_period(), Duration::from_secs(30));

        let settings = load(
            &[("library.toml", "[server]\nshutdown_grace_period_secs = 1\n")],
            Environment::Development,
        )
        .unwrap();
        assert_eq!(settings.server.shutdown_grace_period(), Duration::from_secs(15));
    }

    #[test]
    fn test_page_limits_resolve() {
        let limits = PageLimits::default();
        assert_eq!(limits.resolve(0), 50);
        assert_eq!(limits.resolve(-5), 50);
        assert_eq!(limits.resolve(25), 25);
        assert_eq!(limits.resolve(1000), 200);
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("Dev".parse::<Environment>().unwrap(), Environment::Development);
        assert!("qa".parse::<Environment>().is_err());
    }
}
