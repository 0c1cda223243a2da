//! Application configuration for the restweave host binary.
//!
//! Server settings come from `HOST`/`PORT`; everything governing the
//! hot-reload subsystem is delegated to
//! [`restweave_core::config::HotReloadSettings::from_env`].

use std::env;

use restweave_core::config::{HotReloadSettings, SettingsError};

/// Configuration errors that can occur during application startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable value for {var_name}: {value}")]
    InvalidEnvVar { var_name: String, value: String },

    #[error("Hot-reload settings invalid: {source}")]
    Settings {
        #[from]
        source: SettingsError,
    },
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub settings: HotReloadSettings,
}

impl AppConfig {
    /// Load configuration from the environment with validated defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port_value = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
        let port = port_value
            .parse()
            .map_err(|_| ConfigError::InvalidEnvVar {
                var_name: "PORT".to_string(),
                value: port_value,
            })?;
        let settings = HotReloadSettings::from_env()?;

        Ok(AppConfig {
            host,
            port,
            settings,
        })
    }

    /// Get server bind address.
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_when_env_is_empty() {
        env::remove_var("HOST");
        env::remove_var("PORT");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.server_address(), "127.0.0.1:8080");
        assert!(config.settings.enabled);
    }

    #[test]
    #[serial]
    fn test_invalid_port_is_rejected() {
        env::set_var("PORT", "not-a-port");
        let result = AppConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar { .. })));
        env::remove_var("PORT");
    }

    #[test]
    #[serial]
    fn test_custom_bind_address() {
        env::set_var("HOST", "0.0.0.0");
        env::set_var("PORT", "9100");
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.server_address(), "0.0.0.0:9100");
        env::remove_var("HOST");
        env::remove_var("PORT");
    }
}
