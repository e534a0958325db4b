use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::MigratorConfig;
use crate::db::ConnectionFactory;
use crate::error::Result;
use crate::hierarchy::{PathResolver, SqliteHierarchy};
use crate::migrate::{load_tenants, MigrationEnv, Migrator, PipelineHandle};
use crate::pipeline::ServicePipeline;

#[derive(Parser)]
#[command(name = "tenant-migrator")]
#[command(about = "Versioned migrations for the multi-tenant metadata store")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Show applied and pending migrations
    tenant-migrator status

    # Apply every pending migration
    tenant-migrator migrate

    # Roll back everything above version 2
    tenant-migrator rollback --to 2

    # Resolve a path to its inode
    tenant-migrator resolve hdfs://namenode:8020/proj1/Logs --format json

    # Reverse lookup
    tenant-migrator path-of 4211
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the migrator config file
    #[arg(long, global = true, default_value = "tenant-migrator.toml")]
    pub config: PathBuf,

    /// Path to the metadata store (overrides the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the store version and the state of every step
    Status {
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Apply pending migrations
    Migrate {
        /// Stop after this version (default: latest)
        #[arg(long)]
        to: Option<u32>,
    },

    /// Roll back applied migrations
    Rollback {
        /// Version to roll back to (0 undoes everything)
        #[arg(long)]
        to: u32,
    },

    /// Resolve a path to its inode
    Resolve {
        /// `/p/a`, `scheme://host:port/p/a` or a bare root name
        path: String,

        /// Treat the argument as a top-level name, without splitting
        #[arg(long)]
        root: bool,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Print the path of an inode id
    PathOf {
        id: i64,
    },

    /// Print the partition key of an entry
    PartitionKey {
        parent_id: i64,
        name: String,
        depth: u32,
    },
}

pub fn load_config(cli: &Cli) -> Result<MigratorConfig> {
    let mut config = MigratorConfig::load(Some(&cli.config))?;
    if let Some(db) = &cli.db {
        config.database = db.clone();
    }
    Ok(config)
}

fn open(config: &MigratorConfig) -> Result<ConnectionFactory> {
    ConnectionFactory::open(&config.database, config.pool_size)
}

pub fn show_status(config: &MigratorConfig, format: &str) -> Result<()> {
    let factory = open(config)?;
    let conn = factory.acquire()?;
    let status = Migrator::builtin()?.status(&conn)?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).unwrap_or_default()
        );
        return Ok(());
    }

    println!(
        "Schema version: {} (latest {})",
        status.current_version, status.latest_version
    );
    for step in &status.steps {
        let state = if step.applied { "applied" } else { "pending" };
        println!("  v{:<4} {:<28} {}", step.version, step.name, state);
    }
    Ok(())
}

pub fn run_migrate(config: &MigratorConfig, to: Option<u32>) -> Result<()> {
    let factory = open(config)?;
    let mut conn = factory.acquire()?;
    let tenants = load_tenants(&conn, &config.tenants)?;

    let pipeline = config.pipeline.as_ref().map(ServicePipeline::new);
    let env = MigrationEnv {
        tenants,
        layout: config.hierarchy.layout(),
        scheme: config.hierarchy.scheme(),
        pipeline: pipeline
            .as_ref()
            .zip(config.pipeline.as_ref())
            .map(|(p, c)| PipelineHandle::new(p, c)),
    };

    let applied = Migrator::builtin()?.migrate(&mut conn, &env, to)?;
    if applied.is_empty() {
        println!("Already up to date");
    } else {
        println!("Applied versions: {:?}", applied);
    }
    Ok(())
}

pub fn run_rollback(config: &MigratorConfig, to: u32) -> Result<()> {
    let factory = open(config)?;
    let mut conn = factory.acquire()?;
    let tenants = load_tenants(&conn, &config.tenants)?;

    let env = MigrationEnv {
        tenants,
        layout: config.hierarchy.layout(),
        scheme: config.hierarchy.scheme(),
        pipeline: None,
    };

    let rolled_back = Migrator::builtin()?.rollback(&mut conn, &env, to)?;
    if rolled_back.is_empty() {
        println!("Nothing to roll back");
    } else {
        println!("Rolled back versions: {:?}", rolled_back);
    }
    Ok(())
}

/// Returns whether the path resolved.
pub fn resolve_path(config: &MigratorConfig, path: &str, root: bool, format: &str) -> Result<bool> {
    let factory = open(config)?;
    let conn = factory.acquire()?;
    let resolver = PathResolver::with_layout(
        SqliteHierarchy::new(&conn),
        config.hierarchy.layout(),
        config.hierarchy.scheme(),
    );

    let node = if root {
        resolver.resolve_root(path)?
    } else {
        resolver.resolve(path)?
    };

    match (node, format) {
        (Some(node), "json") => {
            println!("{}", serde_json::to_string_pretty(&node).unwrap_or_default());
            Ok(true)
        }
        (Some(node), _) => {
            println!(
                "{}  id={} parent_id={} partition_id={} {} size={}",
                node.name,
                node.id,
                node.parent_id,
                node.partition_id,
                if node.is_dir { "dir" } else { "file" },
                node.size
            );
            Ok(true)
        }
        (None, "json") => {
            println!("null");
            Ok(false)
        }
        (None, _) => {
            println!("not found: {}", path);
            Ok(false)
        }
    }
}

/// Returns whether the inode and all its ancestors exist.
pub fn show_path_of(config: &MigratorConfig, id: i64) -> Result<bool> {
    let factory = open(config)?;
    let conn = factory.acquire()?;
    let resolver = PathResolver::with_layout(
        SqliteHierarchy::new(&conn),
        config.hierarchy.layout(),
        config.hierarchy.scheme(),
    );

    match resolver.path_of(id)? {
        Some(path) => {
            println!("{}", path);
            Ok(true)
        }
        None => {
            println!("not found: inode {}", id);
            Ok(false)
        }
    }
}

pub fn show_partition_key(config: &MigratorConfig, parent_id: i64, name: &str, depth: u32) {
    println!("{}", config.hierarchy.scheme().derive(parent_id, name, depth));
}
