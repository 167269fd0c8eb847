//! Process configuration read from environment variables.
//!
//! Every variable has a default except `DATABASE_URL`, which is required once
//! persistent stores are enabled. Malformed values are errors, never silently defaulted.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use prismo_observability::{LogConfig, LogFormat};

use crate::lock::{LockPolicies, LockPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required configuration {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Credentials accepted by HTTP basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    /// Postgres + Redis when true, in-process stores otherwise.
    pub use_persistent_stores: bool,
    /// Present whenever `use_persistent_stores` is set.
    pub database: Option<DatabaseConfig>,
    pub redis_url: String,
    /// Default timeout of owning transactions.
    pub transaction_timeout: Duration,
    /// Policy of the `DEFAULT` lock class.
    pub default_lock: LockPolicy,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup (tests, alternative sources).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(&lookup);

        let use_persistent_stores = env.parse_or("USE_PERSISTENT_STORES", false, parse_bool)?;
        let database = match env.get("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                pool_size: env.parse_or("DB_POOL_SIZE", 10, u32::from_str)?,
            }),
            None if use_persistent_stores => return Err(ConfigError::Missing("DATABASE_URL")),
            None => None,
        };

        // Development credentials only exist for the in-memory mode.
        let credential = |key: &'static str| match env.get(key) {
            Some(value) => Ok(value),
            None if use_persistent_stores => Err(ConfigError::Missing(key)),
            None => Ok("admin".to_string()),
        };
        let auth = AuthConfig {
            username: credential("AUTH_USERNAME")?,
            password: credential("AUTH_PASSWORD")?,
        };

        let default_lock = LockPolicy::new(
            Duration::from_millis(env.parse_or("AL_DEF_LOCK_EXPIRY_MS", 10_000, u64::from_str)?),
            env.parse_or("AL_DEF_RETRY_ATTEMPTS", 3, u32::from_str)?,
            Duration::from_millis(env.parse_or("AL_DEF_RETRY_DELAY", 100, u64::from_str)?),
        );

        Ok(Self {
            server: ServerConfig {
                host: env.get("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: env.parse_or("APP_PORT", 8080, u16::from_str)?,
            },
            auth,
            use_persistent_stores,
            database,
            redis_url: env
                .get("REDIS_URL")
                .unwrap_or_else(|| "redis://localhost:6379".to_string()),
            transaction_timeout: Duration::from_millis(env.parse_or(
                "DB_TRANSACTION_TIMEOUT_IN_MS",
                5_000,
                u64::from_str,
            )?),
            default_lock,
            log: LogConfig {
                level: env.get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                format: env.parse_or("LOG_FORMAT", LogFormat::Json, LogFormat::from_str)?,
            },
        })
    }

    pub fn lock_policies(&self) -> LockPolicies {
        LockPolicies::new(self.default_lock.clone())
    }
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; empty counts as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_or<T, E>(
        &self,
        key: &'static str,
        default: T,
        parse: impl Fn(&str) -> Result<T, E>,
    ) -> Result<T, ConfigError>
    where
        E: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(value) => parse(&value).map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("expected a boolean".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_describe_an_in_memory_setup() {
        let config = load(&[]).unwrap();
        assert!(!config.use_persistent_stores);
        assert_eq!(config.database, None);
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.transaction_timeout, Duration::from_secs(5));
        assert_eq!(config.default_lock.retry.max_attempts, 3);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn lock_settings_are_milliseconds() {
        let config = load(&[
            ("AL_DEF_LOCK_EXPIRY_MS", "250"),
            ("AL_DEF_RETRY_ATTEMPTS", "5"),
            ("AL_DEF_RETRY_DELAY", "20"),
        ])
        .unwrap();
        assert_eq!(
            config.default_lock,
            LockPolicy::new(Duration::from_millis(250), 5, Duration::from_millis(20))
        );
    }

    #[test]
    fn persistent_mode_requires_a_database_url() {
        assert_eq!(
            load(&[("USE_PERSISTENT_STORES", "true")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );

        let config = load(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://prismo@localhost/prismo"),
            ("DB_POOL_SIZE", "4"),
            ("AUTH_USERNAME", "ops"),
            ("AUTH_PASSWORD", "s3cret"),
        ])
        .unwrap();
        assert_eq!(config.database.map(|db| db.pool_size), Some(4));
    }

    #[test]
    fn persistent_mode_requires_credentials() {
        let base = [
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://prismo@localhost/prismo"),
        ];
        assert_eq!(load(&base), Err(ConfigError::Missing("AUTH_USERNAME")));

        let mut with_user = base.to_vec();
        with_user.push(("AUTH_USERNAME", "ops"));
        assert_eq!(load(&with_user), Err(ConfigError::Missing("AUTH_PASSWORD")));

        let dev = load(&[]).unwrap();
        assert_eq!(dev.auth.username, "admin");
    }

    #[test]
    fn malformed_values_are_reported_with_their_key() {
        let err = load(&[("APP_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "APP_PORT", .. }));

        let err = load(&[("LOG_FORMAT", "xml")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LOG_FORMAT", .. }));
    }

    #[test]
    fn password_is_not_printed() {
        let config = load(&[("AUTH_PASSWORD", "hunter2")]).unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
