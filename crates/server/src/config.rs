//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOCKROOM_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`; only required when `STOCKROOM_STORE=postgres`)
//!
//! ## Optional
//! - `STOCKROOM_STORE` - Store backend: `postgres` (default) or `memory`
//! - `STOCKROOM_HOST` - Bind address (default: 127.0.0.1)
//! - `STOCKROOM_PORT` - Listen port (default: 3000)
//! - `STOCKROOM_STORE_TIMEOUT_MS` - Upper bound for every store call (default: 5000)
//! - `STOCKROOM_DEFAULT_PAGE_SIZE` - Orders per page when `limit` is omitted (default: 10)
//! - `STOCKROOM_MAX_PAGE_SIZE` - Upper bound for `limit` (default: 50)
//! - `STOCKROOM_SEED_ON_STARTUP` - Seed the default catalog when empty (default: true)
//! - `STOCKROOM_LOG_JSON` - Emit JSON logs when set to `true`
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error event sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Performance trace sample rate (default: 0.0)

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Which persistent store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// `PostgreSQL` via sqlx.
    Postgres,
    /// Process-local store; data is lost on exit.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Store backend selection
    pub store: StoreBackend,
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Seed the default catalog on startup if the store has no products
    pub seed_on_startup: bool,
    /// Emit JSON-formatted logs
    pub log_json: bool,
    /// Inventory and query tuning
    pub inventory: InventoryConfig,
    /// Sentry error tracking configuration
    pub sentry: SentryConfig,
}

/// Settings consumed by the inventory services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryConfig {
    /// Upper bound applied to every store call
    pub store_timeout: Duration,
    /// Page size used when the caller omits `limit`
    pub default_page_size: u32,
    /// Largest page size a caller may request
    pub max_page_size: u32,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(5000),
            default_page_size: 10,
            max_page_size: 50,
        }
    }
}

/// Sentry configuration.
#[derive(Debug, Clone, Default)]
pub struct SentryConfig {
    /// Sentry DSN; Sentry is disabled when unset
    pub dsn: Option<String>,
    /// Environment name reported with events
    pub environment: Option<String>,
    /// Error event sample rate
    pub sample_rate: f32,
    /// Performance trace sample rate
    pub traces_sample_rate: f32,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let store: StoreBackend = env.parse_or("STOCKROOM_STORE", StoreBackend::Postgres)?;
        let database_url = env
            .get("STOCKROOM_DATABASE_URL")
            .or_else(|| env.get("DATABASE_URL"))
            .map(SecretString::from);
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "STOCKROOM_DATABASE_URL".to_string(),
            ));
        }

        let host = env.parse_or("STOCKROOM_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = env.parse_or("STOCKROOM_PORT", 3000_u16)?;
        let seed_on_startup = env.parse_or("STOCKROOM_SEED_ON_STARTUP", true)?;
        let log_json = env.parse_or("STOCKROOM_LOG_JSON", false)?;

        let inventory = InventoryConfig::from_env(&env)?;
        let sentry = SentryConfig {
            dsn: env.get("SENTRY_DSN"),
            environment: env.get("SENTRY_ENVIRONMENT"),
            sample_rate: env.parse_or("SENTRY_SAMPLE_RATE", 1.0_f32)?,
            traces_sample_rate: env.parse_or("SENTRY_TRACES_SAMPLE_RATE", 0.0_f32)?,
        };

        Ok(Self {
            store,
            database_url,
            host,
            port,
            seed_on_startup,
            log_json,
            inventory,
            sentry,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl InventoryConfig {
    fn from_env<F>(env: &Env<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let timeout_ms: u64 = env.parse_or("STOCKROOM_STORE_TIMEOUT_MS", 5000)?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "STOCKROOM_STORE_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let max_page_size = env.parse_or("STOCKROOM_MAX_PAGE_SIZE", defaults.max_page_size)?;
        let default_page_size =
            env.parse_or("STOCKROOM_DEFAULT_PAGE_SIZE", defaults.default_page_size)?;
        if max_page_size == 0 || default_page_size == 0 || default_page_size > max_page_size {
            return Err(ConfigError::InvalidEnvVar(
                "STOCKROOM_DEFAULT_PAGE_SIZE".to_string(),
                format!(
                    "page sizes must satisfy 0 < default ({default_page_size}) <= max ({max_page_size})"
                ),
            ));
        }

        Ok(Self {
            store_timeout: Duration::from_millis(timeout_ms),
            default_page_size,
            max_page_size,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup with typed parsing helpers.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get a variable, treating blank values as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "STOCKROOM_DATABASE_URL"));
    }

    #[test]
    fn test_database_url_fallback() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/stockroom")]).unwrap();
        assert_eq!(config.store, StoreBackend::Postgres);
        assert_eq!(
            config.database_url.unwrap().expose_secret(),
            "postgres://localhost/stockroom"
        );
    }

    #[test]
    fn test_memory_defaults() {
        let config = load(&[("STOCKROOM_STORE", "memory")]).unwrap();
        assert_eq!(config.store, StoreBackend::Memory);
        assert!(config.database_url.is_none());
        assert!(config.seed_on_startup);
        assert!(!config.log_json);
        assert_eq!(config.inventory, InventoryConfig::default());
        assert!(config.sentry.dsn.is_none());

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("STOCKROOM_STORE", "memory"),
            ("STOCKROOM_PORT", "8080"),
            ("STOCKROOM_STORE_TIMEOUT_MS", "250"),
            ("STOCKROOM_MAX_PAGE_SIZE", "20"),
            ("STOCKROOM_SEED_ON_STARTUP", "false"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.inventory.store_timeout, Duration::from_millis(250));
        assert_eq!(config.inventory.max_page_size, 20);
        assert!(!config.seed_on_startup);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = load(&[("STOCKROOM_STORE", "memory"), ("STOCKROOM_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "STOCKROOM_PORT"));

        let err = load(&[("STOCKROOM_STORE", "redis")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "STOCKROOM_STORE"));

        let err = load(&[
            ("STOCKROOM_STORE", "memory"),
            ("STOCKROOM_DEFAULT_PAGE_SIZE", "80"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = load(&[
            ("STOCKROOM_STORE", "memory"),
            ("STOCKROOM_STORE_TIMEOUT_MS", "0"),
        ])
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "STOCKROOM_STORE_TIMEOUT_MS")
        );
    }
}
