//! Migrator configuration loaded from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MigratorError, Result};
use crate::hierarchy::{
    partition, HierarchyLayout, PartitionScheme, MAX_INODE_DEPTH, ROOT_DEPTH, ROOT_PARENT_ID,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigratorConfig {
    /// Path to the metadata store
    pub database: PathBuf,
    pub pool_size: u32,
    /// Tenants to migrate; empty means "every row of the project table"
    pub tenants: Vec<String>,
    pub hierarchy: HierarchyConfig,
    pub pipeline: Option<PipelineConfig>,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("metastore.db"),
            pool_size: 4,
            tenants: Vec::new(),
            hierarchy: HierarchyConfig::default(),
            pipeline: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HierarchyConfig {
    pub root_parent_id: i64,
    pub root_depth: u32,
    pub random_partitioning_max_level: u32,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            root_parent_id: ROOT_PARENT_ID,
            root_depth: ROOT_DEPTH,
            random_partitioning_max_level: partition::DEFAULT_RANDOM_PARTITIONING_MAX_LEVEL,
        }
    }
}

impl HierarchyConfig {
    pub fn layout(&self) -> HierarchyLayout {
        HierarchyLayout {
            root_parent_id: self.root_parent_id,
            root_depth: self.root_depth,
        }
    }

    pub fn scheme(&self) -> PartitionScheme {
        PartitionScheme::new(self.random_partitioning_max_level)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub stop_command: Vec<String>,
    pub start_command: Vec<String>,
    pub config_file: PathBuf,
    #[serde(default = "default_reindex_key")]
    pub reindex_key: String,
    #[serde(default = "default_queue_table")]
    pub queue_table: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

fn default_reindex_key() -> String {
    "reindex".to_string()
}

fn default_queue_table() -> String {
    "hdfs_metadata_log".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_drain_timeout_secs() -> u64 {
    3600
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl MigratorConfig {
    /// Loads the config file, or defaults when `path` is `None` or the file
    /// does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(MigratorError::Config("pool_size must be at least 1".into()));
        }
        if self.hierarchy.root_parent_id < 0 {
            return Err(MigratorError::Config(
                "hierarchy.root_parent_id must not be negative".into(),
            ));
        }
        if self.hierarchy.root_depth == 0 || self.hierarchy.root_depth > MAX_INODE_DEPTH {
            return Err(MigratorError::Config(format!(
                "hierarchy.root_depth must be between 1 and {}",
                MAX_INODE_DEPTH
            )));
        }
        if let Some(pipeline) = &self.pipeline {
            if pipeline.stop_command.is_empty() || pipeline.start_command.is_empty() {
                return Err(MigratorError::Config(
                    "pipeline.stop_command and pipeline.start_command must not be empty".into(),
                ));
            }
            if pipeline.poll_interval_ms == 0 {
                return Err(MigratorError::Config(
                    "pipeline.poll_interval_ms must be at least 1".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = MigratorConfig::load(None).unwrap();
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.hierarchy.layout(), HierarchyLayout::default());
        assert_eq!(config.hierarchy.scheme(), PartitionScheme::default());
        assert!(config.pipeline.is_none());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = MigratorConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.database, PathBuf::from("metastore.db"));
    }

    #[test]
    fn test_full_config() {
        let config = MigratorConfig::from_toml(
            r#"
            database = "/var/lib/meta.db"
            pool_size = 2
            tenants = ["demo", "prod"]

            [hierarchy]
            root_parent_id = 0
            root_depth = 2
            random_partitioning_max_level = 2

            [pipeline]
            stop_command = ["systemctl", "stop", "epipe"]
            start_command = ["systemctl", "start", "epipe"]
            config_file = "/srv/epipe/config.ini"
            poll_interval_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.tenants, vec!["demo", "prod"]);
        assert_eq!(config.hierarchy.layout().root_depth, 2);
        let pipeline = config.pipeline.unwrap();
        assert_eq!(pipeline.reindex_key, "reindex");
        assert_eq!(pipeline.queue_table, "hdfs_metadata_log");
        assert_eq!(pipeline.poll_interval(), Duration::from_millis(500));
        assert_eq!(pipeline.drain_timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(MigratorConfig::from_toml("pool_size = 0").is_err());
        assert!(MigratorConfig::from_toml("[hierarchy]\nroot_depth = 0").is_err());
        assert!(MigratorConfig::from_toml("[hierarchy]\nroot_depth = 4294967295").is_err());
        assert!(MigratorConfig::from_toml("[hierarchy]\nroot_depth = 32768").is_err());
        assert!(MigratorConfig::from_toml("[hierarchy]\nroot_depth = 32767").is_ok());
        assert!(MigratorConfig::from_toml("unknown_key = 1").is_err());
        assert!(MigratorConfig::from_toml(
            "[pipeline]\nstop_command = []\nstart_command = [\"x\"]\nconfig_file = \"c\""
        )
        .is_err());
    }
}
