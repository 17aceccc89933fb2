//! Service configuration.

use crate::error::{DiscussionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Which entity store backs the service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Process-local maps; data is lost on exit.
    #[default]
    Memory,

    /// SQLite database file.
    Sqlite {
        path: PathBuf,
        /// How long to wait on a locked database file.
        #[serde(default = "default_busy_timeout_ms")]
        busy_timeout_ms: u64,
    },
}

impl StorageConfig {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        StorageConfig::Sqlite {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            StorageConfig::Memory => StorageKind::Memory,
            StorageConfig::Sqlite { .. } => StorageKind::Sqlite,
        }
    }
}

/// Storage backend name, as given on a command line or in the environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Sqlite,
}

impl FromStr for StorageKind {
    type Err = DiscussionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "sqlite" => Ok(StorageKind::Sqlite),
            other => Err(DiscussionError::Config(format!(
                "unknown storage type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Memory => write!(f, "memory"),
            StorageKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Top-level service configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionConfig {
    #[serde(default)]
    pub storage: StorageConfig,
}

impl DiscussionConfig {
    /// Parse from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build from a backend name plus an optional database path.
    pub fn for_kind(kind: StorageKind, path: Option<PathBuf>) -> Result<Self> {
        let storage = match kind {
            StorageKind::Memory => StorageConfig::Memory,
            StorageKind::Sqlite => {
                let path = path.ok_or_else(|| {
                    DiscussionError::Config("sqlite storage requires a database path".into())
                })?;
                StorageConfig::sqlite(path)
            }
        };
        Ok(Self { storage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_memory() {
        assert_eq!(DiscussionConfig::default().storage, StorageConfig::Memory);
        assert_eq!(
            DiscussionConfig::from_json("{}").unwrap().storage,
            StorageConfig::Memory
        );
    }

    #[test]
    fn test_parse_sqlite_config() {
        let config =
            DiscussionConfig::from_json(r#"{"storage": {"kind": "sqlite", "path": "/tmp/d.db"}}"#)
                .unwrap();
        assert_eq!(config.storage, StorageConfig::sqlite("/tmp/d.db"));
        assert_eq!(config.storage.kind(), StorageKind::Sqlite);
    }

    #[test]
    fn test_storage_kind_parse() {
        assert_eq!("memory".parse::<StorageKind>().unwrap(), StorageKind::Memory);
        assert_eq!("SQLite".parse::<StorageKind>().unwrap(), StorageKind::Sqlite);

        let err = "postgres".parse::<StorageKind>().unwrap_err();
        assert!(err.to_string().contains("unknown storage type: postgres"));
    }

    #[test]
    fn test_sqlite_kind_requires_path() {
        assert!(DiscussionConfig::for_kind(StorageKind::Sqlite, None).is_err());
        assert!(DiscussionConfig::for_kind(StorageKind::Memory, None).is_ok());
    }

    #[test]
    fn test_malformed_json() {
        let result = DiscussionConfig::from_json("{not json");
        assert!(matches!(result, Err(DiscussionError::Config(_))));
    }
}
