//! Configuration loading helpers.
//!
//! Configuration comes from a TOML document with three flat sections
//! (`[store]`, `[log]`, `[compaction]`), optionally overridden by
//! `TIDELOG_<SECTION>_<FIELD>` environment variables, e.g.
//! `TIDELOG_LOG_BUFFER_SIZE=16`.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::allocator::HybridLogConfig;
use crate::compaction::CompactionType;
use crate::status::Status;
use crate::store::StoreConfig;

/// Errors returned by configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The document is not valid TOML (or violates the schema).
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// An environment override was unknown or unparsable.
    #[error("bad environment override {key}: {detail}")]
    Override {
        /// Full variable name.
        key: String,
        /// What was wrong with it.
        detail: String,
    },
}

/// Top-level configuration schema.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TidelogConfig {
    /// Store configuration.
    pub store: Option<StoreSection>,
    /// Hybrid log configuration.
    pub log: Option<LogSection>,
    /// Compaction configuration.
    pub compaction: Option<CompactionSection>,
}

/// `[store]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSection {
    /// Number of hash index buckets.
    pub table_size: Option<u64>,
}

/// `[log]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSection {
    /// Page size as a power of two.
    pub page_size_bits: Option<u32>,
    /// Number of in-memory page slots.
    pub buffer_size: Option<u32>,
    /// Ring slots reserved as always-empty.
    pub empty_page_count: Option<u32>,
    /// Fraction of in-memory pages kept mutable.
    pub mutable_fraction: Option<f64>,
}

/// `[compaction]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompactionSection {
    /// Default strategy: `"lookup"` or `"scan"`.
    pub default_type: Option<String>,
}

impl TidelogConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load configuration from the `TIDELOG_CONFIG` file (if the variable is
    /// set), then apply `TIDELOG_*` overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var("TIDELOG_CONFIG").ok() {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply every `TIDELOG_*` environment override in-place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        for (key, value) in env::vars() {
            let Some(name) = key.strip_prefix("TIDELOG_") else {
                continue;
            };
            if name == "CONFIG" {
                // Points at the config file; not an override.
                continue;
            }
            self.apply_override(name, value.trim())?;
        }
        Ok(())
    }

    /// Apply one override; `name` is the variable name without the
    /// `TIDELOG_` prefix (case-insensitive).
    pub fn apply_override(&mut self, name: &str, raw: &str) -> Result<(), ConfigError> {
        match name.to_ascii_uppercase().as_str() {
            "STORE_TABLE_SIZE" => self.store_mut().table_size = Some(env_parse(name, raw)?),
            "LOG_PAGE_SIZE_BITS" => self.log_mut().page_size_bits = Some(env_parse(name, raw)?),
            "LOG_BUFFER_SIZE" => self.log_mut().buffer_size = Some(env_parse(name, raw)?),
            "LOG_EMPTY_PAGE_COUNT" => {
                self.log_mut().empty_page_count = Some(env_parse(name, raw)?)
            }
            "LOG_MUTABLE_FRACTION" => {
                self.log_mut().mutable_fraction = Some(env_parse(name, raw)?)
            }
            "COMPACTION_DEFAULT_TYPE" => {
                self.compaction_mut().default_type = Some(raw.to_string())
            }
            _ => {
                return Err(ConfigError::Override {
                    key: format!("TIDELOG_{name}"),
                    detail: "unknown key".into(),
                })
            }
        }
        Ok(())
    }

    fn store_mut(&mut self) -> &mut StoreSection {
        self.store.get_or_insert_with(Default::default)
    }

    fn log_mut(&mut self) -> &mut LogSection {
        self.log.get_or_insert_with(Default::default)
    }

    fn compaction_mut(&mut self) -> &mut CompactionSection {
        self.compaction.get_or_insert_with(Default::default)
    }

    /// Resolve a `StoreConfig`: defaults overlaid with this document.
    pub fn to_store_config(&self) -> StoreConfig {
        let defaults = StoreConfig::default();
        let section = self.store.clone().unwrap_or_default();
        StoreConfig {
            table_size: section.table_size.unwrap_or(defaults.table_size),
            log: self.to_log_config(),
        }
    }

    /// Resolve a `HybridLogConfig`: defaults overlaid with this document.
    pub fn to_log_config(&self) -> HybridLogConfig {
        let defaults = HybridLogConfig::default();
        let section = self.log.clone().unwrap_or_default();
        HybridLogConfig {
            page_size_bits: section.page_size_bits.unwrap_or(defaults.page_size_bits),
            buffer_size: section.buffer_size.unwrap_or(defaults.buffer_size),
            empty_page_count: section.empty_page_count.unwrap_or(defaults.empty_page_count),
            mutable_fraction: section.mutable_fraction.unwrap_or(defaults.mutable_fraction),
        }
    }

    /// Resolve the configured default compaction strategy.
    pub fn to_compaction_type(&self) -> Result<CompactionType, Status> {
        match self.compaction.as_ref().and_then(|c| c.default_type.as_deref()) {
            Some(name) => CompactionType::parse(name),
            None => Ok(CompactionType::Lookup),
        }
    }
}

fn env_parse<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Override {
        key: format!("TIDELOG_{name}"),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let config = TidelogConfig::from_toml(
            r#"
            [store]
            table_size = 4096

            [log]
            page_size_bits = 14
            buffer_size = 16
            empty_page_count = 2
            mutable_fraction = 0.75

            [compaction]
            default_type = "scan"
            "#,
        )
        .unwrap();

        let store = config.to_store_config();
        assert_eq!(store.table_size, 4096);
        assert_eq!(store.log.page_size_bits, 14);
        assert_eq!(store.log.buffer_size, 16);
        assert_eq!(store.log.empty_page_count, 2);
        assert_eq!(store.log.mutable_fraction, 0.75);
        assert_eq!(config.to_compaction_type().unwrap(), CompactionType::Scan);
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = TidelogConfig::from_toml("").unwrap();
        let store = config.to_store_config();
        assert_eq!(store.table_size, StoreConfig::default().table_size);
        assert_eq!(config.to_compaction_type().unwrap(), CompactionType::Lookup);
    }

    #[test]
    fn overrides_update_sections() {
        let mut config = TidelogConfig::default();
        config.apply_override("LOG_BUFFER_SIZE", "8").unwrap();
        config.apply_override("store_table_size", "2048").unwrap();
        config.apply_override("COMPACTION_DEFAULT_TYPE", "scan").unwrap();

        assert_eq!(config.to_log_config().buffer_size, 8);
        assert_eq!(config.to_store_config().table_size, 2048);
        assert_eq!(config.to_compaction_type().unwrap(), CompactionType::Scan);
    }

    #[test]
    fn unknown_override_is_rejected() {
        let mut config = TidelogConfig::default();
        let err = config.apply_override("CACHE_SIZE", "1").unwrap_err();
        assert!(err.to_string().contains("TIDELOG_CACHE_SIZE"));
    }

    #[test]
    fn unparsable_override_reports_the_key() {
        let mut config = TidelogConfig::default();
        let err = config.apply_override("LOG_BUFFER_SIZE", "many").unwrap_err();
        assert!(err.to_string().contains("TIDELOG_LOG_BUFFER_SIZE"));
    }

    #[test]
    fn bad_compaction_type_is_rejected() {
        let config = TidelogConfig::from_toml(
            r#"
            [compaction]
            default_type = "vacuum"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.to_compaction_type().unwrap_err(),
            Status::InvalidCompactionType
        );
    }
}
