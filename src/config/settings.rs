//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Environment variables are applied on top by [`Config::apply_env`].

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// DSS connection settings.
    #[serde(default)]
    pub dss: DssConfig,

    /// Job and scenario polling settings.
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Overrides file values with the `DSS_*` environment variables.
    ///
    /// `lookup` abstracts `std::env::var` so tests can supply their own
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `DSS_TIMEOUT_SECS` is not a number.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DSS_HOST") {
            self.dss.host = Some(host);
        }
        if let Some(key) = lookup("DSS_API_KEY") {
            self.dss.api_key = Some(key);
        }
        if let Some(insecure) = lookup("DSS_INSECURE_TLS") {
            self.dss.insecure_tls = insecure.trim().eq_ignore_ascii_case("true");
        }
        if let Some(timeout) = lookup("DSS_TIMEOUT_SECS") {
            self.dss.timeout_secs = timeout
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    name: "DSS_TIMEOUT_SECS",
                })?;
        }
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let host = self.dss.host.as_deref().map(str::trim).unwrap_or_default();
        if host.is_empty() {
            return Err(ConfigError::ValidationError {
                message: "DSS host is required (set DSS_HOST or dss.host)".to_string(),
            });
        }
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(ConfigError::ValidationError {
                message: format!("DSS host '{host}' must start with http:// or https://"),
            });
        }

        let has_key = self
            .dss
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());
        if !has_key {
            return Err(ConfigError::ValidationError {
                message: "DSS API key is required (set DSS_API_KEY or dss.api_key)".to_string(),
            });
        }

        if self.dss.timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "dss.timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.jobs.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "jobs.poll_interval_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// DSS connection configuration.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DssConfig {
    /// Base URL of the DSS instance, e.g. `https://dss.example.com:11200`.
    #[serde(default)]
    pub host: Option<String>,

    /// Personal or global API key.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Skip TLS certificate verification.
    /// Default: true
    #[serde(default = "default_true")]
    pub insecure_tls: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// Hand-written so the API key never reaches the logs.
impl std::fmt::Debug for DssConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DssConfig")
            .field("host", &self.host)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("insecure_tls", &self.insecure_tls)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for DssConfig {
    fn default() -> Self {
        Self {
            host: None,
            api_key: None,
            insecure_tls: default_true(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    60
}

/// Polling configuration for job builds and scenario runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    /// Delay between two status polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on how long a tool waits for a job or run to finish.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

const fn default_poll_interval_ms() -> u64 {
    2000
}

const fn default_max_wait_secs() -> u64 {
    3600
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.dss.insecure_tls);
        assert_eq!(config.dss.timeout_secs, 60);
        // No host or key yet
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "dss": {
                "host": "https://dss.example.com:11200",
                "api_key": "secret",
                "insecure_tls": false,
                "timeout_secs": 30
            },
            "jobs": {
                "poll_interval_ms": 500,
                "max_wait_secs": 120
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.dss.host.as_deref(),
            Some("https://dss.example.com:11200")
        );
        assert!(!config.dss.insecure_tls);
        assert_eq!(config.dss.timeout_secs, 30);
        assert_eq!(config.jobs.poll_interval_ms, 500);
        assert_eq!(config.jobs.max_wait_secs, 120);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: Config =
            serde_json::from_str(r#"{"dss": {"host": "http://old:11200", "api_key": "a"}}"#)
                .unwrap();
        config
            .apply_env(env(&[
                ("DSS_HOST", "http://new:11200"),
                ("DSS_API_KEY", "b"),
                ("DSS_INSECURE_TLS", "FALSE"),
                ("DSS_TIMEOUT_SECS", "15"),
            ]))
            .unwrap();

        assert_eq!(config.dss.host.as_deref(), Some("http://new:11200"));
        assert_eq!(config.dss.api_key.as_deref(), Some("b"));
        assert!(!config.dss.insecure_tls);
        assert_eq!(config.dss.timeout_secs, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn insecure_tls_only_enabled_by_true() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("DSS_INSECURE_TLS", "yes")]))
            .unwrap();
        assert!(!config.dss.insecure_tls);

        config
            .apply_env(env(&[("DSS_INSECURE_TLS", "True")]))
            .unwrap();
        assert!(config.dss.insecure_tls);
    }

    #[test]
    fn reject_bad_timeout_env() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("DSS_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("DSS_TIMEOUT_SECS"));
    }

    #[test]
    fn reject_missing_api_key() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("DSS_HOST", "http://localhost:11200")]))
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn reject_host_without_scheme() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("DSS_HOST", "localhost:11200"), ("DSS_API_KEY", "k")]))
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_zero_poll_interval() {
        let json = r#"{
            "dss": {"host": "http://localhost", "api_key": "k"},
            "jobs": {"poll_interval_ms": 0}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = DssConfig {
            api_key: Some("super-secret".to_string()),
            ..DssConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
