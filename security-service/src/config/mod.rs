use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityServiceConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub storage: StorageConfig,
    pub security: SecuritySettings,
    pub rate_limit: RateLimitConfig,
    pub retention: RetentionConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

/// Storage backend selection. `Memory` keeps everything in-process and is
/// meant for local development only.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecuritySettings {
    /// Shared key the outer application presents on internal routes.
    pub internal_api_key: String,
    pub allowed_origins: Vec<String>,
    /// Default session lifetime; per-user overrides win.
    pub session_timeout_minutes: i64,
    /// Extended lifetime for remember-me renewals.
    pub extended_session_minutes: i64,
    /// Issuer label embedded in TOTP provisioning URIs.
    pub mfa_issuer: String,
    /// 64-char hex key sealing MFA secrets at rest.
    pub mfa_encryption_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub session_max_requests: u32,
    pub session_window_minutes: i64,
    pub login_failure_max_requests: u32,
    pub login_failure_window_minutes: i64,
    pub mfa_max_requests: u32,
    pub mfa_window_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    pub audit_log_days: i64,
    pub security_event_days: i64,
    /// Minutes between maintenance sweeps.
    pub cleanup_interval_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Disabled,
}

impl SecurityServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = SecurityServiceConfig {
            common,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("security-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            storage: StorageConfig {
                backend: get_env("STORAGE_BACKEND", Some("postgres"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
                database: DatabaseConfig {
                    url: get_env(
                        "DATABASE_URL",
                        Some("postgres://localhost/security"),
                        is_prod,
                    )?,
                    max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                    min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
                },
            },
            security: SecuritySettings {
                internal_api_key: get_env("INTERNAL_API_KEY", None, is_prod)?,
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                session_timeout_minutes: parse_env("SESSION_TIMEOUT_MINUTES", "30", is_prod)?,
                extended_session_minutes: parse_env("EXTENDED_SESSION_MINUTES", "10080", is_prod)?,
                mfa_issuer: get_env("MFA_ISSUER", Some("security-service"), is_prod)?,
                mfa_encryption_key: get_env("MFA_ENCRYPTION_KEY", None, is_prod)?,
            },
            rate_limit: RateLimitConfig {
                session_max_requests: parse_env("RATE_LIMIT_SESSION_MAX", "10", is_prod)?,
                session_window_minutes: parse_env("RATE_LIMIT_SESSION_WINDOW_MINUTES", "15", is_prod)?,
                login_failure_max_requests: parse_env("RATE_LIMIT_LOGIN_FAILURE_MAX", "20", is_prod)?,
                login_failure_window_minutes: parse_env(
                    "RATE_LIMIT_LOGIN_FAILURE_WINDOW_MINUTES",
                    "15",
                    is_prod,
                )?,
                mfa_max_requests: parse_env("RATE_LIMIT_MFA_MAX", "10", is_prod)?,
                mfa_window_minutes: parse_env("RATE_LIMIT_MFA_WINDOW_MINUTES", "5", is_prod)?,
            },
            retention: RetentionConfig {
                audit_log_days: parse_env("AUDIT_LOG_RETENTION_DAYS", "365", is_prod)?,
                security_event_days: parse_env("SECURITY_EVENT_RETENTION_DAYS", "180", is_prod)?,
                cleanup_interval_minutes: parse_env("CLEANUP_INTERVAL_MINUTES", "15", is_prod)?,
            },
            swagger: SwaggerConfig {
                enabled: get_env("SWAGGER_ENABLED", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.security.internal_api_key.len() < 16 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "INTERNAL_API_KEY must be at least 16 characters"
            )));
        }
        if hex::decode(&self.security.mfa_encryption_key)
            .map(|k| k.len() != 32)
            .unwrap_or(true)
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MFA_ENCRYPTION_KEY must be 64 hex characters (32 bytes)"
            )));
        }
        if self.security.session_timeout_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_TIMEOUT_MINUTES must be positive"
            )));
        }
        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?.parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!(format!("Invalid value for {}: {}", key, e)))
    })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}
