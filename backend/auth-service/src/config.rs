//! Configuration management for the auth service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! # Example
//!
//! ```no_run
//! use auth_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("listening on {}:{}", settings.server.host, settings.server.port);
//!     Ok(())
//! }
//! ```

use anyhow::{bail, Context, Result};
use chrono::Duration;
use crypto_core::JwtKeys;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

/// Signing secret used when nothing is configured outside production
const DEV_FALLBACK_JWT_SECRET: &str = "dev-only-insecure-jwt-secret-change-me";

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub environment: AppEnvironment,
    pub database: DatabaseSettings,
    pub jwt: JwtSettings,
    pub tokens: TokenSettings,
    pub server: ServerSettings,
    pub email: EmailSettings,
    pub oauth: Option<OAuthSettings>,
    pub maintenance: MaintenanceSettings,
}

impl Settings {
    /// Load settings from environment variables
    ///
    /// A `.env` file is read first in debug builds.
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        let environment = AppEnvironment::from_env();

        Ok(Settings {
            environment,
            database: DatabaseSettings::from_env()?,
            jwt: JwtSettings::from_env(environment)?,
            tokens: TokenSettings::from_env()?,
            server: ServerSettings::from_env()?,
            email: EmailSettings::from_env()?,
            oauth: OAuthSettings::from_env(),
            maintenance: MaintenanceSettings::from_env()?,
        })
    }
}

/// Deployment environment (`APP_ENV`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppEnvironment {
    Development,
    Staging,
    Production,
}

impl AppEnvironment {
    pub fn from_env() -> Self {
        Self::parse(&env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()))
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => AppEnvironment::Production,
            "staging" => AppEnvironment::Staging,
            _ => AppEnvironment::Development,
        }
    }

    /// Development fallbacks (signing key, in-memory store) are refused here
    pub fn is_production_like(&self) -> bool {
        matches!(self, AppEnvironment::Production | AppEnvironment::Staging)
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// `None` selects the in-memory store (development only)
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            acquire_timeout: env::var("DATABASE_ACQUIRE_TIMEOUT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid DATABASE_ACQUIRE_TIMEOUT")?,
        })
    }
}

/// JWT signing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    pub signing_key: String,
    pub validation_key: Option<String>,
    pub algorithm: String,
}

impl JwtSettings {
    /// Load JWT configuration from environment variables
    ///
    /// Priority:
    /// 1. `JWT_PRIVATE_KEY` / `JWT_PUBLIC_KEY` (RS256 PEM)
    /// 2. `JWT_SECRET` (HS256)
    /// 3. Built-in development secret, only outside production/staging
    fn from_env(environment: AppEnvironment) -> Result<Self> {
        if let Ok(private_pem) = env::var("JWT_PRIVATE_KEY") {
            return Ok(Self {
                signing_key: private_pem,
                validation_key: env::var("JWT_PUBLIC_KEY").ok(),
                algorithm: "RS256".to_string(),
            });
        }

        let signing_key = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if environment.is_production_like() => {
                bail!("JWT_SECRET or JWT_PRIVATE_KEY must be set in production/staging")
            }
            _ => {
                warn!("JWT_SECRET not set; using development fallback secret");
                DEV_FALLBACK_JWT_SECRET.to_string()
            }
        };

        Ok(Self {
            signing_key,
            validation_key: None,
            algorithm: "HS256".to_string(),
        })
    }

    /// Build the signing keys these settings describe
    pub fn keys(&self) -> Result<JwtKeys> {
        match self.algorithm.as_str() {
            "RS256" => {
                let public_pem = self
                    .validation_key
                    .as_deref()
                    .context("JWT_PUBLIC_KEY must be set together with JWT_PRIVATE_KEY")?;
                JwtKeys::from_rsa_pem(&self.signing_key, public_pem)
                    .context("Failed to load RS256 keys")
            }
            "HS256" => JwtKeys::from_secret(self.signing_key.as_bytes())
                .context("Failed to load HS256 secret"),
            other => bail!("Unsupported JWT algorithm: {other}"),
        }
    }
}

/// Token lifetimes in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSettings {
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub verification_ttl_secs: i64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            verification_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl TokenSettings {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            access_ttl_secs: parse_or("ACCESS_TOKEN_TTL_SECS", defaults.access_ttl_secs)?,
            refresh_ttl_secs: parse_or("REFRESH_TOKEN_TTL_SECS", defaults.refresh_ttl_secs)?,
            verification_ttl_secs: parse_or(
                "VERIFICATION_TOKEN_TTL_SECS",
                defaults.verification_ttl_secs,
            )?,
        };

        if settings.access_ttl_secs <= 0
            || settings.refresh_ttl_secs <= 0
            || settings.verification_ttl_secs <= 0
        {
            bail!("token lifetimes must be positive");
        }
        if settings.access_ttl_secs >= settings.refresh_ttl_secs {
            bail!("ACCESS_TOKEN_TTL_SECS must be shorter than REFRESH_TOKEN_TTL_SECS");
        }

        Ok(settings)
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::seconds(self.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_ttl_secs)
    }

    pub fn verification_ttl(&self) -> Duration {
        Duration::seconds(self.verification_ttl_secs)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Take the client IP from `X-Forwarded-For` / `X-Real-IP`.
    /// Only enable behind a proxy that overwrites these headers.
    pub trust_proxy_headers: bool,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid SERVER_PORT")?,
            trust_proxy_headers: env::var("TRUST_PROXY_HEADERS")
                .map(|v| v.parse())
                .unwrap_or(Ok(false))
                .context("Invalid TRUST_PROXY_HEADERS")?,
        })
    }
}

/// Email service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    pub use_starttls: bool,
    pub verification_base_url: Option<String>,
}

impl EmailSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            smtp_host: env::var("SMTP_HOST").unwrap_or_default(),
            smtp_port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .context("Invalid SMTP_PORT")?,
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            smtp_from: env::var("SMTP_FROM")
                .or_else(|_| env::var("FROM_EMAIL"))
                .unwrap_or_else(|_| "noreply@localhost".to_string()),
            use_starttls: env::var("SMTP_USE_STARTTLS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            verification_base_url: env::var("EMAIL_VERIFICATION_BASE_URL").ok(),
        })
    }
}

/// OpenID Connect provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSettings {
    pub provider: String,
    pub domain: String,
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub scope: String,
}

impl OAuthSettings {
    /// `None` unless domain, client ID, secret and callback URL are all present
    fn from_env() -> Option<Self> {
        let domain = env::var("OAUTH_DOMAIN").ok().filter(|v| !v.is_empty())?;
        let client_id = env::var("OAUTH_CLIENT_ID").ok().filter(|v| !v.is_empty())?;
        let client_secret = env::var("OAUTH_CLIENT_SECRET").ok().filter(|v| !v.is_empty())?;
        let callback_url = env::var("OAUTH_CALLBACK_URL").ok().filter(|v| !v.is_empty())?;

        Some(Self {
            provider: env::var("OAUTH_PROVIDER").unwrap_or_else(|_| "auth0".to_string()),
            domain,
            client_id,
            client_secret,
            callback_url,
            scope: env::var("OAUTH_SCOPE").unwrap_or_else(|_| "openid profile email".to_string()),
        })
    }
}

/// Background maintenance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceSettings {
    pub sweep_interval_secs: u64,
}

impl MaintenanceSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            sweep_interval_secs: parse_or("TOKEN_SWEEP_INTERVAL_SECS", 3600)?,
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key}")),
        Err(_) => Ok(default),
    }
}
