//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BAZAAR_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `BAZAAR_HOST` - Bind address (default: 127.0.0.1)
//! - `BAZAAR_PORT` - Listen port (default: 8080)
//! - `BAZAAR_TOKEN_TTL_DAYS` - Lifetime of issued access tokens (default: 30)
//! - `BAZAAR_CORS_ORIGINS` - Comma-separated list of allowed browser origins
//! - `SHIPPING_CHARGE_INSIDE_CITY` - Shipping charge inside the city (default: 60)
//! - `SHIPPING_CHARGE_OUTSIDE_CITY` - Shipping charge outside the city (default: 120)
//! - `STEADFAST_BASE_URL` - Courier API base URL (default: <https://portal.packzy.com/api/v1>)
//! - `STEADFAST_API_KEY` / `STEADFAST_SECRET_KEY` - Courier credentials (both or neither)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` / `SENTRY_TRACES_SAMPLE_RATE` - Sampling rates (default: 1.0)
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

use bazaar_core::ShippingZone;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Bearer token lifetime when `BAZAAR_TOKEN_TTL_DAYS` is unset.
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 30;

/// Default courier endpoint.
pub const DEFAULT_STEADFAST_BASE_URL: &str = "https://portal.packzy.com/api/v1";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Days before an issued access token expires
    pub token_ttl_days: i64,
    /// Browser origins allowed by CORS (empty = CORS disabled)
    pub cors_origins: Vec<String>,
    /// Shipping charges per delivery zone
    pub shipping: ShippingConfig,
    /// Courier credentials; `None` disables shipment booking
    pub courier: Option<CourierConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. production, staging)
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
    /// Log output format
    pub log_format: LogFormat,
}

/// Flat shipping charges by zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingConfig {
    pub inside_city: Decimal,
    pub outside_city: Decimal,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            inside_city: Decimal::from(60),
            outside_city: Decimal::from(120),
        }
    }
}

impl ShippingConfig {
    /// Shipping charge for a delivery zone.
    #[must_use]
    pub const fn charge_for(&self, zone: ShippingZone) -> Decimal {
        match zone {
            ShippingZone::InsideCity => self.inside_city,
            ShippingZone::OutsideCity => self.outside_city,
        }
    }
}

/// Steadfast courier API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct CourierConfig {
    /// API base URL without trailing slash
    pub base_url: String,
    /// `Api-Key` header value
    pub api_key: SecretString,
    /// `Secret-Key` header value
    pub secret_key: SecretString,
}

impl std::fmt::Debug for CourierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourierConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if courier secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("BAZAAR_DATABASE_URL")?;
        let host = parse_env("BAZAAR_HOST", "127.0.0.1")?;
        let port = parse_env("BAZAAR_PORT", "8080")?;
        let token_ttl_days: i64 =
            parse_env("BAZAAR_TOKEN_TTL_DAYS", &DEFAULT_TOKEN_TTL_DAYS.to_string())?;
        if token_ttl_days <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "BAZAAR_TOKEN_TTL_DAYS".to_string(),
                "must be positive".to_string(),
            ));
        }
        let cors_origins = get_optional_env("BAZAAR_CORS_ORIGINS")
            .map(|v| parse_list(&v))
            .unwrap_or_default();

        let shipping = ShippingConfig::from_env()?;
        let courier = CourierConfig::from_env()?;

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let log_format = match get_optional_env("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            database_url,
            host,
            port,
            token_ttl_days,
            cors_origins,
            shipping,
            courier,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            log_format,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl ShippingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let inside_city: Decimal = parse_env("SHIPPING_CHARGE_INSIDE_CITY", "60")?;
        let outside_city: Decimal = parse_env("SHIPPING_CHARGE_OUTSIDE_CITY", "120")?;
        for (key, value) in [
            ("SHIPPING_CHARGE_INSIDE_CITY", inside_city),
            ("SHIPPING_CHARGE_OUTSIDE_CITY", outside_city),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(ConfigError::InvalidEnvVar(
                    key.to_string(),
                    "cannot be negative".to_string(),
                ));
            }
        }
        Ok(Self {
            inside_city,
            outside_city,
        })
    }
}

impl CourierConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let api_key = get_optional_env("STEADFAST_API_KEY");
        let secret_key = get_optional_env("STEADFAST_SECRET_KEY");

        let (api_key, secret_key) = match (api_key, secret_key) {
            (None, None) => return Ok(None),
            (Some(api_key), Some(secret_key)) => (api_key, secret_key),
            (Some(_), None) => {
                return Err(ConfigError::MissingEnvVar("STEADFAST_SECRET_KEY".to_string()));
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingEnvVar("STEADFAST_API_KEY".to_string()));
            }
        };

        validate_secret_strength(&api_key, "STEADFAST_API_KEY")?;
        validate_secret_strength(&secret_key, "STEADFAST_SECRET_KEY")?;

        let base_url = get_env_or_default("STEADFAST_BASE_URL", DEFAULT_STEADFAST_BASE_URL);
        let parsed = url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("STEADFAST_BASE_URL".to_string(), e.to_string())
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEnvVar(
                "STEADFAST_BASE_URL".to_string(),
                "must be an http(s) URL".to_string(),
            ));
        }

        Ok(Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key),
            secret_key: SecretString::from(secret_key),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Split a comma-separated list, dropping empty entries.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-steadfast-key", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("k3Jd9sLq0Pz7XwV2mN5bR8tY", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" https://a.test, ,https://b.test "),
            vec!["https://a.test".to_string(), "https://b.test".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_shipping_charge_for_zone() {
        let shipping = ShippingConfig::default();
        assert_eq!(shipping.charge_for(ShippingZone::InsideCity), Decimal::from(60));
        assert_eq!(
            shipping.charge_for(ShippingZone::OutsideCity),
            Decimal::from(120)
        );
    }

    #[test]
    fn test_socket_addr() {
        let config = ApiConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 8080,
            token_ttl_days: 30,
            cors_origins: Vec::new(),
            shipping: ShippingConfig::default(),
            courier: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 1.0,
            log_format: LogFormat::Text,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_courier_config_debug_redacts_secrets() {
        let config = CourierConfig {
            base_url: DEFAULT_STEADFAST_BASE_URL.to_string(),
            api_key: SecretString::from("super_secret_api_key"),
            secret_key: SecretString::from("super_secret_secret_key"),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("packzy.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_api_key"));
        assert!(!debug_output.contains("super_secret_secret_key"));
    }
}
