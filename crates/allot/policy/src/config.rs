//! Engine configuration

use crate::error::{EnforcerError, EnforcerResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_reconcile_on_query() -> bool {
    true
}

/// Engine configuration, read from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Rule source file
    pub rules_path: Option<PathBuf>,

    /// Seed data for the in-memory adapters
    pub fixture_path: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Reconcile pools before each product query
    #[serde(default = "default_reconcile_on_query")]
    pub reconcile_on_query: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            fixture_path: None,
            log_filter: default_log_filter(),
            reconcile_on_query: default_reconcile_on_query(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `path`, or the default location. A missing
    /// file yields the defaults.
    pub fn load(path: Option<&Path>) -> EnforcerResult<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .map_err(|e| EnforcerError::Config(format!("{}: {}", config_path.display(), e)))?;
            Self::from_toml(&contents)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> EnforcerResult<Self> {
        toml::from_str(contents).map_err(|e| EnforcerError::Config(e.to_string()))
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> EnforcerResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| EnforcerError::Config("Cannot find config directory".into()))?;
        Ok(config_dir.join("allot").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.rules_path.is_none());
        assert_eq!(config.log_filter, "info");
        assert!(config.reconcile_on_query);
    }

    #[test]
    fn test_load_missing_config() {
        let config = EngineConfig::load(Some(Path::new("/nonexistent/path/config.toml"))).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rules_path = \"/etc/allot/rules.allot\"").unwrap();
        writeln!(file, "reconcile_on_query = false").unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.rules_path, Some(PathBuf::from("/etc/allot/rules.allot")));
        assert!(!config.reconcile_on_query);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = EngineConfig::from_toml("rule_path = \"typo\"").unwrap_err();
        assert!(matches!(err, EnforcerError::Config(_)));
        assert!(err.is_boot_fatal());
    }
}
