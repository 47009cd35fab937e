//! Runtime configuration, loaded from TOML.
//!
//! # Example
//!
//! ```toml
//! [index]
//! name = "cirrus"
//!
//! [write]
//! transaction_threshold = 10
//! best_effort = false
//!
//! [reindex]
//! concurrency = 10
//! page_size = 100
//!
//! [repair]
//! page_size = 100
//! concurrency = 2
//! stale_after_secs = 18000
//!
//! [retry]
//! max_attempts = 5
//! base_delay_ms = 200
//! max_delay_ms = 10000
//!
//! [reconcile]
//! ignored_fields = ["timestamp"]
//! ```
//!
//! Every section and field is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("error reading config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CirrusConfig {
    pub index: IndexConfig,
    pub write: WriteConfig,
    pub reindex: ReindexConfig,
    pub repair: RepairConfig,
    pub retry: RetryConfig,
    pub reconcile: ReconcileConfig,
}

/// `[index]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index (or alias) the replicator writes to.
    pub name: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            name: cirrus_index::DEFAULT_INDEX.to_string(),
        }
    }
}

/// `[write]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConfig {
    /// Invocations producing fewer records than this are written in one
    /// transaction.
    pub transaction_threshold: usize,
    /// Always write records independently.
    pub best_effort: bool,
}

impl Default for WriteConfig {
    fn default() -> Self {
        WriteConfig {
            transaction_threshold: 10,
            best_effort: false,
        }
    }
}

/// `[reindex]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReindexConfig {
    pub concurrency: usize,
    pub page_size: usize,
}

impl Default for ReindexConfig {
    fn default() -> Self {
        ReindexConfig {
            concurrency: 10,
            page_size: 100,
        }
    }
}

/// `[repair]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub page_size: usize,
    /// Orchestrator lookups in flight at once.
    pub concurrency: usize,
    /// A running execution older than this is stopped.
    pub stale_after_secs: u64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        RepairConfig {
            page_size: 100,
            concurrency: 2,
            stale_after_secs: 5 * 60 * 60,
        }
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 10_000,
        }
    }
}

/// `[reconcile]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Fields excluded from payload comparison.
    pub ignored_fields: Vec<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            ignored_fields: vec![cirrus_index::TIMESTAMP_FIELD.to_string()],
        }
    }
}

impl CirrusConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: CirrusConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`; `None` means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&source)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.index.name.is_empty(), "index.name must not be empty"),
            (
                self.write.transaction_threshold == 0,
                "write.transaction_threshold must be at least 1",
            ),
            (self.reindex.concurrency == 0, "reindex.concurrency must be at least 1"),
            (self.reindex.page_size == 0, "reindex.page_size must be at least 1"),
            (self.repair.concurrency == 0, "repair.concurrency must be at least 1"),
            (self.repair.page_size == 0, "repair.page_size must be at least 1"),
            (self.retry.max_attempts == 0, "retry.max_attempts must be at least 1"),
            (
                self.retry.max_delay_ms < self.retry.base_delay_ms,
                "retry.max_delay_ms must not be below retry.base_delay_ms",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Invalid(message.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_source_is_all_defaults() {
        let config = CirrusConfig::from_toml_str("").unwrap();
        assert_eq!(config, CirrusConfig::default());
        assert_eq!(config.write.transaction_threshold, 10);
        assert_eq!(config.repair.stale_after_secs, 18_000);
        assert_eq!(config.reconcile.ignored_fields, vec!["timestamp".to_string()]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = CirrusConfig::from_toml_str(
            "[write]\nbest_effort = true\n\n[index]\nname = \"cirrus-2024\"\n",
        )
        .unwrap();
        assert!(config.write.best_effort);
        assert_eq!(config.write.transaction_threshold, 10);
        assert_eq!(config.index.name, "cirrus-2024");
        assert_eq!(config.reindex.concurrency, 10);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = CirrusConfig::from_toml_str("[reindex]\nconcurrency = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(m) if m.contains("reindex.concurrency")));
    }

    #[test]
    fn unparsable_toml_is_a_parse_error() {
        assert!(matches!(
            CirrusConfig::from_toml_str("[write\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_file_or_defaults() {
        assert_eq!(CirrusConfig::load(None).unwrap(), CirrusConfig::default());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[repair]\nstale_after_secs = 60").unwrap();
        let config = CirrusConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.repair.stale_after_secs, 60);

        let missing = CirrusConfig::load(Some(Path::new("/nonexistent/cirrus.toml")));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
