//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Server configuration, read from `CRM_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Upper bound for a single write transaction. The remote database can
    /// be slow; this is generous on purpose so a stalled transaction
    /// surfaces as a distinct timeout error instead of hanging the request.
    pub tx_timeout: Duration,
    /// Allowed CORS origin for the browser UI (`*` if unset).
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/brokerage-crm.db"),
            tx_timeout: Duration::from_secs(30),
            cors_origin: None,
        }
    }
}

impl ServerConfig {
    /// Build a config from environment variables.
    ///
    /// Unset variables fall back to defaults; a set but unparsable value is
    /// an error rather than a silent fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = match std::env::var("CRM_PORT") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CRM_PORT".into(),
                message: format!("'{v}' is not a valid port number"),
            })?,
            Err(_) => defaults.port,
        };

        let db_path = std::env::var("CRM_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let tx_timeout = match std::env::var("CRM_TX_TIMEOUT_SECS") {
            Ok(v) => {
                let secs: u64 = v.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "CRM_TX_TIMEOUT_SECS".into(),
                    message: format!("'{v}' is not a valid number of seconds"),
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => defaults.tx_timeout,
        };

        let cors_origin = std::env::var("CRM_CORS_ORIGIN").ok().filter(|v| !v.is_empty());

        Ok(Self {
            port,
            db_path,
            tx_timeout,
            cors_origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.tx_timeout, Duration::from_secs(30));
        assert!(config.cors_origin.is_none());
    }

    // Single test: the CRM_* variables are process-global, so the set/unset
    // sequence must not interleave with another test.
    #[test]
    fn from_env_rejects_unparsable_values() {
        unsafe { std::env::set_var("CRM_PORT", "not-a-port") };
        let err = ServerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "CRM_PORT"));

        unsafe { std::env::set_var("CRM_PORT", "9090") };
        unsafe { std::env::set_var("CRM_TX_TIMEOUT_SECS", "soon") };
        let err = ServerConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "CRM_TX_TIMEOUT_SECS"
        ));

        unsafe { std::env::set_var("CRM_TX_TIMEOUT_SECS", "5") };
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.tx_timeout, Duration::from_secs(5));

        unsafe { std::env::remove_var("CRM_PORT") };
        unsafe { std::env::remove_var("CRM_TX_TIMEOUT_SECS") };
    }
}
