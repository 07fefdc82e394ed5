//! Store configuration loaded from TOML.
//!
//! - [`StoreConfig`] - which backend to build and which namespace to bind
//! - [`BackendKind`] - the engine behind the store
//! - [`ValidationResult`] - non-fatal findings from [`StoreConfig::validate`]
//!
//! Every field has a default, so an empty file yields an in-memory store
//! bound to `micro/micro`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::store::{MemoryStore, Options, default_dir};

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Storage engine behind a configured store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Volatile [`MemoryStore`].
    #[default]
    Memory,
    /// Durable [`FileStore`](crate::store::FileStore).
    File,
}

/// `stowage.toml` configuration structure.
///
/// ```toml
/// backend = "file"
/// directory = "/var/lib/app/store"
/// database = "app"
/// table = "sessions"
/// cache = true
/// sweep_interval_secs = 60
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Base directory of the file backend. Falls back to [`default_dir`].
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_table")]
    pub table: String,
    /// Put an in-memory cache in front of the backend.
    #[serde(default)]
    pub cache: bool,
    /// Expiry sweep period for in-memory stores; `0` disables sweeping.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_database() -> String {
    constants::DEFAULT_DATABASE.to_string()
}

fn default_table() -> String {
    constants::DEFAULT_TABLE.to_string()
}

fn default_sweep_interval_secs() -> u64 {
    constants::DEFAULT_SWEEP_INTERVAL.as_secs()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            directory: None,
            database: default_database(),
            table: default_table(),
            cache: false,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from `stowage.toml` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if stowage.toml cannot be read or contains invalid TOML.
    pub fn load() -> Result<Self> {
        Self::load_from("stowage.toml")
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - A field has an invalid type or an unknown name
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: StoreConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Namespace the configured store binds to.
    pub fn options(&self) -> Options {
        Options::default()
            .database(&self.database)
            .table(&self.table)
    }

    /// Base directory of the file backend.
    pub fn directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(default_dir)
    }

    /// Sweep period, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// Builds an in-memory store bound to the configured namespace, with the
    /// configured sweeper.
    pub(crate) fn memory_store(&self) -> MemoryStore {
        let store = MemoryStore::with_options(self.options());
        match self.sweep_interval() {
            Some(interval) => store.with_sweep_interval(interval),
            None => store,
        }
    }

    /// Validate configuration.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error listing every problem found:
    /// - Empty database or table name
    /// - Database or table name containing a path separator or `..`
    /// - Directory that exists but is not a directory
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for (field, value) in [("database", &self.database), ("table", &self.table)] {
            if value.is_empty() {
                errors.push(format!("{field} cannot be empty"));
            } else if value.contains(['/', '\\']) || value == "." || value == ".." {
                errors.push(format!(
                    "{field} '{value}' is not a valid name\n  \
                     Names are used as file names and cannot contain path separators"
                ));
            }
        }

        match self.backend {
            BackendKind::File => {
                let dir = self.directory();
                if dir.exists() && !dir.is_dir() {
                    errors.push(format!(
                        "Store directory is not a directory: {}\n  \
                         Expected a directory holding one database per namespace",
                        dir.display()
                    ));
                }
            },
            BackendKind::Memory => {
                if self.directory.is_some() {
                    warnings.push(
                        "directory is ignored by the memory backend\n  \
                         Set backend = \"file\" to persist records"
                            .to_string(),
                    );
                }
                if self.cache {
                    warnings.push(
                        "cache = true on the memory backend only duplicates every record"
                            .to_string(),
                    );
                }
            },
        }

        if let Some(interval) = self.sweep_interval()
            && interval < constants::MIN_RECOMMENDED_SWEEP_INTERVAL
        {
            warnings.push(format!(
                "sweep_interval_secs {} is very low\n  \
                 Recommendation: sweep every {}s or more",
                self.sweep_interval_secs,
                constants::MIN_RECOMMENDED_SWEEP_INTERVAL.as_secs()
            ));
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config: StoreConfig = toml::from_str("").unwrap();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.database, constants::DEFAULT_DATABASE);
        assert_eq!(config.table, constants::DEFAULT_TABLE);
        assert!(!config.cache);
        assert_eq!(
            config.sweep_interval(),
            Some(constants::DEFAULT_SWEEP_INTERVAL)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_file_backend() {
        let toml_str = r#"
backend = "file"
directory = "/var/lib/app/store"
database = "app"
table = "sessions"
cache = true
sweep_interval_secs = 0
"#;
        let config: StoreConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend, BackendKind::File);
        assert_eq!(config.directory(), PathBuf::from("/var/lib/app/store"));
        assert!(config.cache);
        assert_eq!(config.sweep_interval(), None);

        let options = config.options();
        assert_eq!(options.database, "app");
        assert_eq!(options.table, "sessions");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result: std::result::Result<StoreConfig, _> = toml::from_str(r#"backend = "sql""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<StoreConfig, _> = toml::from_str("port = 3000");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_empty_names() {
        let config = StoreConfig {
            database: String::new(),
            table: String::new(),
            ..StoreConfig::default()
        };

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("database cannot be empty"));
        assert!(err.contains("table cannot be empty"));
    }

    #[test]
    fn test_validate_path_separator_in_table() {
        let config = StoreConfig {
            table: "../escape".to_string(),
            ..StoreConfig::default()
        };

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("not a valid name"));
    }

    #[test]
    fn test_validate_directory_is_file() {
        use std::io::Write;
        use tempfile::tempdir;

        let dir = tempdir().unwrap();
        let file_path = dir.path().join("not-a-dir");
        let mut file = fs::File::create(&file_path).unwrap();
        file.write_all(b"test").unwrap();

        let config = StoreConfig {
            backend: BackendKind::File,
            directory: Some(file_path),
            ..StoreConfig::default()
        };

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("not a directory"));
    }

    #[test]
    fn test_validate_memory_warnings() {
        let config = StoreConfig {
            directory: Some(PathBuf::from("/tmp/unused")),
            cache: true,
            ..StoreConfig::default()
        };

        let result = config.validate().unwrap();
        assert!(result.has_warnings());
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        use tempfile::tempdir;

        let dir = tempdir().unwrap();
        let path = dir.path().join("stowage.toml");
        fs::write(&path, "table = \"jobs\"\n").unwrap();

        let config = StoreConfig::load_from(&path).unwrap();
        assert_eq!(config.table, "jobs");
        assert_eq!(config.database, constants::DEFAULT_DATABASE);
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = StoreConfig::load_from("/nonexistent/stowage.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
