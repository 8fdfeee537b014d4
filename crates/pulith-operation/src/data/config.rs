//! Executor configuration loaded from TOML.
//!
//! ```toml
//! [io]
//! thread_name = "app-net"
//! max_concurrent = 8
//!
//! [processing]
//! threads = 2
//!
//! [limits]
//! max_size = 8388608
//! ```

use std::path::Path;

use serde::Deserialize;

use super::options::BufferLimits;
use crate::error::ConfigError;

/// Configuration of the persistent I/O executor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Name of the dedicated network thread.
    ///
    /// Default: "pulith-io"
    pub thread_name: String,

    /// Maximum number of operations connected at the same time.
    /// Further operations wait in the ready queue.
    ///
    /// Default: 4
    pub max_concurrent: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            thread_name: "pulith-io".to_string(),
            max_concurrent: 4,
        }
    }
}

/// Configuration of the processing pool used for work transforms.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Prefix for pool thread names.
    ///
    /// Default: "pulith-processing"
    pub thread_name: String,

    /// Maximum number of transforms running at once.
    ///
    /// Default: available parallelism
    pub threads: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            thread_name: "pulith-processing".to_string(),
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub io:         IoConfig,
    pub processing: ProcessingConfig,
    /// Default buffer limits for operations that do not set their own.
    pub limits:     BufferLimits,
}

impl RuntimeConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.io.max_concurrent == 0 {
            return Err(ConfigError::Invalid("io.max_concurrent must be at least 1".into()));
        }
        if self.processing.threads == 0 {
            return Err(ConfigError::Invalid("processing.threads must be at least 1".into()));
        }
        if self.limits.capacity_hint > self.limits.max_size {
            return Err(ConfigError::Invalid(format!(
                "limits.capacity_hint ({}) exceeds limits.max_size ({})",
                self.limits.capacity_hint, self.limits.max_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config.io.thread_name, "pulith-io");
        assert_eq!(config.io.max_concurrent, 4);
        assert_eq!(config.limits, BufferLimits::default());
        assert!(config.processing.threads >= 1);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [io]
            max_concurrent = 8

            [processing]
            threads = 2

            [limits]
            max_size = 8388608
            "#,
        )
        .unwrap();
        assert_eq!(config.io.max_concurrent, 8);
        assert_eq!(config.io.thread_name, "pulith-io");
        assert_eq!(config.processing.threads, 2);
        assert_eq!(config.limits.max_size, 8 * 1024 * 1024);
        assert_eq!(config.limits.capacity_hint, 1024 * 1024);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = RuntimeConfig::from_toml_str("[io]\nmax_concurrent = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn hint_above_max_is_rejected() {
        let err = RuntimeConfig::from_toml_str("[limits]\ncapacity_hint = 10\nmax_size = 5\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = RuntimeConfig::from_toml_str("[io\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.toml");
        std::fs::write(&path, "[io]\nthread_name = \"net\"\n").unwrap();
        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.io.thread_name, "net");
    }
}
