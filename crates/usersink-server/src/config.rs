//! Configuration management for the usersink service.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use usersink_server::config::ServiceConfig;
//!
//! // Load from file with env overrides
//! let config = ServiceConfig::load("usersink.yaml")?;
//!
//! // Or load from environment only
//! let config = ServiceConfig::from_env()?;
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use usersink_domain::{ResolverConfig, SaverConfig, MAX_CHUNK_SIZE};

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "USERSINK";

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServiceConfig {
    /// Write buffer settings
    #[serde(default)]
    pub saver: SaverSettings,

    /// Batch lookup settings
    #[serde(default)]
    pub resolver: ResolverSettings,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Write buffer settings.
///
/// Environment variables: `USERSINK_SAVER__CAPACITY`,
/// `USERSINK_SAVER__CHUNK_SIZE`, `USERSINK_SAVER__FLUSH_INTERVAL_MS`,
/// `USERSINK_SAVER__CHUNK_TIMEOUT_MS`.
///
/// # Example YAML Configuration
///
/// ```yaml
/// saver:
///   capacity: 1000
///   chunk_size: 100
///   flush_interval_ms: 1000
///   chunk_timeout_ms: 5000
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SaverSettings {
    /// Maximum number of buffered users; the oldest is dropped when full
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Users per storage write
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Milliseconds between background flushes
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Per-chunk storage timeout in milliseconds (unset waits indefinitely)
    #[serde(default)]
    pub chunk_timeout_ms: Option<u64>,
}

impl Default for SaverSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            chunk_size: default_chunk_size(),
            flush_interval_ms: default_flush_interval_ms(),
            chunk_timeout_ms: None,
        }
    }
}

impl SaverSettings {
    /// Converts to the domain configuration.
    pub fn to_saver_config(&self) -> SaverConfig {
        SaverConfig {
            capacity: self.capacity,
            chunk_size: self.chunk_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            chunk_timeout: self.chunk_timeout_ms.map(Duration::from_millis),
        }
    }
}

fn default_capacity() -> usize {
    1000
}

fn default_chunk_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    1000
}

/// Batch lookup settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResolverSettings {
    /// Ids per storage read
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunks fetched concurrently (1 = sequential)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-chunk storage timeout in milliseconds (unset waits indefinitely)
    #[serde(default)]
    pub chunk_timeout_ms: Option<u64>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            concurrency: default_concurrency(),
            chunk_timeout_ms: None,
        }
    }
}

impl ResolverSettings {
    /// Converts to the domain configuration.
    pub fn to_resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            chunk_size: self.chunk_size,
            concurrency: self.concurrency,
            chunk_timeout: self.chunk_timeout_ms.map(Duration::from_millis),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type: only "memory" is available
    #[serde(default = "default_storage_backend")]
    pub backend: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,

    /// Log span enter/exit events
    #[serde(default)]
    pub spans: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            spans: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServiceConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `USERSINK_` and use `__` as
    /// separator, e.g. `USERSINK_SAVER__CAPACITY=500` overrides
    /// `saver.capacity`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServiceConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        let service_config: ServiceConfig = config.try_deserialize()?;
        service_config.validate()?;

        Ok(service_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServiceConfig::default())?)
            .add_source(env_source())
            .build()?;

        let service_config: ServiceConfig = config.try_deserialize()?;
        service_config.validate()?;

        Ok(service_config)
    }

    /// Validate the configuration.
    ///
    /// Sizes, intervals and timeouts must be positive.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let positive = [
            ("saver.capacity", self.saver.capacity as u64),
            ("saver.chunk_size", self.saver.chunk_size as u64),
            ("saver.flush_interval_ms", self.saver.flush_interval_ms),
            ("resolver.chunk_size", self.resolver.chunk_size as u64),
            ("resolver.concurrency", self.resolver.concurrency as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigLoadError::Invalid {
                    message: format!("{field} must be greater than 0"),
                });
            }
        }

        for (field, value) in [
            ("saver.chunk_size", self.saver.chunk_size),
            ("resolver.chunk_size", self.resolver.chunk_size),
        ] {
            if value > MAX_CHUNK_SIZE {
                return Err(ConfigLoadError::Invalid {
                    message: format!("{field} must be at most {MAX_CHUNK_SIZE}, got {value}"),
                });
            }
        }

        for (field, value) in [
            ("saver.chunk_timeout_ms", self.saver.chunk_timeout_ms),
            ("resolver.chunk_timeout_ms", self.resolver.chunk_timeout_ms),
        ] {
            if value == Some(0) {
                return Err(ConfigLoadError::Invalid {
                    message: format!("{field} must be greater than 0 when set"),
                });
            }
        }

        let valid_backends = ["memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "storage.backend must be one of: {:?}, got: {}",
                    valid_backends, self.storage.backend
                ),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }
}

// USERSINK_SAVER__CAPACITY -> saver.capacity
fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Test: Can load config from YAML file
    #[test]
    #[serial]
    fn test_can_load_config_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
saver:
  capacity: 50
  chunk_size: 10
  flush_interval_ms: 250
  chunk_timeout_ms: 2000

resolver:
  chunk_size: 20
  concurrency: 4

logging:
  level: debug
  json: true
  spans: true
"#
        )
        .unwrap();

        let config = ServiceConfig::load(file.path()).unwrap();

        assert_eq!(config.saver.capacity, 50);
        assert_eq!(config.saver.chunk_size, 10);
        assert_eq!(config.saver.flush_interval_ms, 250);
        assert_eq!(config.saver.chunk_timeout_ms, Some(2000));
        assert_eq!(config.resolver.chunk_size, 20);
        assert_eq!(config.resolver.concurrency, 4);
        assert_eq!(config.resolver.chunk_timeout_ms, None);
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert!(config.logging.spans);
    }

    /// Test: Can override config with env vars
    #[test]
    #[serial]
    fn test_can_override_config_with_env_vars() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
saver:
  capacity: 50
  chunk_size: 10
"#
        )
        .unwrap();

        std::env::set_var("USERSINK_SAVER__CAPACITY", "75");
        std::env::set_var("USERSINK_LOGGING__LEVEL", "warn");

        let config = ServiceConfig::load(file.path());

        std::env::remove_var("USERSINK_SAVER__CAPACITY");
        std::env::remove_var("USERSINK_LOGGING__LEVEL");

        let config = config.unwrap();
        assert_eq!(config.saver.capacity, 75); // Overridden by env
        assert_eq!(config.saver.chunk_size, 10); // From file
        assert_eq!(config.logging.level, "warn"); // Overridden by env
    }

    /// Test: Config validation catches errors
    #[test]
    fn test_config_validation_catches_errors() {
        let cases: Vec<(fn(&mut ServiceConfig), &str)> = vec![
            (|c| c.saver.capacity = 0, "saver.capacity"),
            (|c| c.saver.chunk_size = 0, "saver.chunk_size"),
            (|c| c.saver.flush_interval_ms = 0, "saver.flush_interval_ms"),
            (|c| c.saver.chunk_timeout_ms = Some(0), "saver.chunk_timeout_ms"),
            (|c| c.resolver.chunk_size = 0, "resolver.chunk_size"),
            (|c| c.resolver.concurrency = 0, "resolver.concurrency"),
            (
                |c| c.resolver.chunk_size = MAX_CHUNK_SIZE + 1,
                "resolver.chunk_size",
            ),
            (|c| c.storage.backend = "postgres".to_string(), "storage.backend"),
            (|c| c.logging.level = "invalid".to_string(), "logging.level"),
        ];

        for (mutate, field) in cases {
            let mut config = ServiceConfig::default();
            mutate(&mut config);
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains(field),
                "error for {field} should name it, got: {err}"
            );
        }
    }

    /// Test: Invalid config returns clear error
    #[test]
    fn test_invalid_config_returns_clear_error() {
        let result = ServiceConfig::load("/nonexistent/path/usersink.yaml");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigLoadError::FileNotFound { .. }));
        assert!(err.to_string().contains("not found"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: syntax: [").unwrap();
        let err = ServiceConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Load(_)));

        // Negative sizes do not deserialize into unsigned fields.
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "saver:\n  chunk_size: -5").unwrap();
        assert!(ServiceConfig::load(file.path()).is_err());
    }

    /// Test: Default config is valid
    #[test]
    fn test_default_config_is_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());

        assert_eq!(config.saver.capacity, 1000);
        assert_eq!(config.saver.chunk_size, 100);
        assert_eq!(config.saver.flush_interval_ms, 1000);
        assert_eq!(config.resolver.concurrency, 1);
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(!config.logging.spans);
    }

    /// Test: from_env loads defaults with env overrides
    #[test]
    #[serial]
    fn test_from_env_loads_defaults_with_env_overrides() {
        std::env::set_var("USERSINK_RESOLVER__CONCURRENCY", "8");

        let config = ServiceConfig::from_env();

        std::env::remove_var("USERSINK_RESOLVER__CONCURRENCY");

        let config = config.unwrap();
        assert_eq!(config.resolver.concurrency, 8);
        assert_eq!(config.resolver.chunk_size, 100); // default
    }

    #[test]
    fn test_settings_convert_to_domain_configs() {
        let mut config = ServiceConfig::default();
        config.saver.flush_interval_ms = 20;
        config.saver.chunk_timeout_ms = Some(5);
        config.resolver.chunk_timeout_ms = Some(7);

        let saver = config.saver.to_saver_config();
        assert_eq!(saver.flush_interval, Duration::from_millis(20));
        assert_eq!(saver.chunk_timeout, Some(Duration::from_millis(5)));
        assert!(saver.validate().is_ok());

        let resolver = config.resolver.to_resolver_config();
        assert_eq!(resolver.chunk_timeout, Some(Duration::from_millis(7)));
        assert!(resolver.validate().is_ok());
    }
}
