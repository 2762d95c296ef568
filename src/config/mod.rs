//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk, applying
//! the `DSS_*` environment variables on top and validating the result.
//!
//! # Configuration Sources
//!
//! Sources are applied in the following order, later ones winning:
//!
//! 1. Built-in defaults
//! 2. The configuration file:
//!    - Path specified on the command line, which must exist, or
//!    - Default location, read only when present:
//!      - **Linux/macOS:** `~/.dataiku-mcp/config.json`
//!      - **Windows:** `%USERPROFILE%\.dataiku-mcp\config.json`
//! 3. A `.env` file in the working directory
//! 4. Environment variables: `DSS_HOST`, `DSS_API_KEY`, `DSS_INSECURE_TLS`,
//!    `DSS_TIMEOUT_SECS`

mod settings;

pub use settings::{Config, DssConfig, JobsConfig, LoggingConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.dataiku-mcp/`
/// - **Windows:** `%USERPROFILE%\.dataiku-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".dataiku-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads the configuration from file and environment.
///
/// If `path` is `None`, the default location is used when it exists.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - A `.env` file exists but is malformed
/// - Required settings (host, API key) are missing or invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            read_config_file(p)?
        }
        None => match default_config_path() {
            Some(p) if p.exists() => read_config_file(&p)?,
            _ => Config::default(),
        },
    };

    load_env_file(Path::new(".env"))?;

    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;

    Ok(config)
}

/// Exports the variables of a `.env` file. A missing file is not an error.
fn load_env_file(path: &Path) -> Result<(), ConfigError> {
    match dotenv::from_path(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Loaded environment file");
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(source) => Err(ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Reads and parses one JSON configuration file.
fn read_config_file(config_path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_dir_exists() {
        assert!(default_config_dir().is_some());
    }

    #[test]
    fn default_config_path_exists() {
        let path = default_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("config.json"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let err = load_config(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn missing_env_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_env_file(&dir.path().join(".env")).is_ok());
    }

    #[test]
    fn malformed_env_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "NOT A VALID LINE\n").unwrap();
        let err = load_env_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::EnvFile { .. }));
        assert!(err.to_string().contains(".env"));
    }

    #[test]
    fn reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"dss": {"host": "https://dss.local", "api_key": "k"}, "logging": {"level": "info"}}"#,
        )
        .unwrap();
        let config = read_config_file(&path).unwrap();
        assert_eq!(config.dss.host.as_deref(), Some("https://dss.local"));
        assert_eq!(config.logging.level, "info");
    }
}
