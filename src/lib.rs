pub mod config;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod migrate;
pub mod pipeline;

pub use config::{HierarchyConfig, MigratorConfig, PipelineConfig};
pub use db::ConnectionFactory;
pub use error::{MigratorError, Result};
pub use hierarchy::{
    derive, CachedLookup, HierarchyLayout, HierarchyLookup, HierarchyPath, Node, NodeKey,
    PartitionScheme, PathResolver, SqliteHierarchy, ROOT_DEPTH, ROOT_PARENT_ID,
};
pub use migrate::{
    MigrationContext, MigrationEnv, MigrationStatus, MigrationStep, Migrator, PipelineHandle,
    Tenant,
};
pub use pipeline::{IndexingPipeline, QueueProbe, ServicePipeline, SqlQueueProbe};
