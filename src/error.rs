//! Error types for dataiku-mcp.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include credentials.
//! The DSS API key is only ever placed in the `Authorization` header and
//! no error variant carries it.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// A `.env` file exists but could not be loaded.
    #[error("failed to load environment file: {path}")]
    EnvFile {
        /// Path to the `.env` file.
        path: PathBuf,
        /// The underlying dotenv error.
        #[source]
        source: dotenv::Error,
    },

    /// An environment variable held a value that could not be used.
    #[error("invalid value for environment variable {name}")]
    InvalidEnv {
        /// Name of the variable.
        name: &'static str,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while talking to the DSS public API.
#[derive(Error, Debug)]
pub enum DssError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// The request never produced an HTTP response.
    #[error("request to DSS failed: {0}")]
    Transport(String),

    /// DSS answered with a non-success status.
    #[error("DSS returned HTTP {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// DSS answered with a body that is not the expected JSON.
    #[error("invalid response from DSS: {0}")]
    InvalidResponse(String),

    /// A job or scenario run did not finish in time.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout {
        /// What was being waited for.
        what: String,
        /// How long we waited.
        waited: Duration,
    },
}

impl DssError {
    /// Returns `true` if DSS reported the object as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/path/to/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("config.json"));
    }

    #[test]
    fn validation_error_display() {
        let error = ConfigError::ValidationError {
            message: "invalid setting".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("invalid setting"));
    }

    #[test]
    fn api_error_display() {
        let error = DssError::Api {
            status: 404,
            message: "Dataset does not exist: PROJ.orders".to_string(),
        };
        assert!(error.is_not_found());
        assert_eq!(
            error.to_string(),
            "DSS returned HTTP 404: Dataset does not exist: PROJ.orders"
        );
    }

    #[test]
    fn timeout_error_display() {
        let error = DssError::Timeout {
            what: "job build_x".to_string(),
            waited: Duration::from_secs(30),
        };
        assert!(!error.is_not_found());
        assert_eq!(
            error.to_string(),
            "timed out after 30s waiting for job build_x"
        );

        let error = DssError::Timeout {
            what: "scenario NIGHTLY".to_string(),
            waited: Duration::from_millis(20),
        };
        assert_eq!(
            error.to_string(),
            "timed out after 20ms waiting for scenario NIGHTLY"
        );
    }
}
