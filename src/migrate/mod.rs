//! Versioned migrations of the metadata store.
//!
//! The applied version is tracked in the `meta` table under `schema_version`,
//! and every applied step is listed in `migration_history`. Steps run in
//! version order; each one gets its own transaction unless it opts out.

pub mod steps;
pub mod tenants;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{MigratorError, Result};
use crate::hierarchy::{
    CachedLookup, HierarchyLayout, PartitionScheme, PathResolver, SqliteHierarchy,
};
use crate::pipeline::IndexingPipeline;
pub use tenants::{load_tenants, Tenant};

/// One versioned migration.
pub trait MigrationStep: Send + Sync {
    /// Version this step migrates the store to. Must be unique and non-zero.
    fn version(&self) -> u32;

    /// Name for logging and the history table
    fn name(&self) -> &'static str;

    fn run(&self, ctx: &MigrationContext<'_>) -> Result<()>;

    fn rollback(&self, ctx: &MigrationContext<'_>) -> Result<()>;

    /// Steps that wait on other processes opt out of the wrapping
    /// transaction so they observe concurrent commits.
    fn transactional(&self) -> bool {
        true
    }
}

/// Pipeline handle plus how to wait for its queue.
pub struct PipelineHandle<'a> {
    pub pipeline: &'a dyn IndexingPipeline,
    pub queue_table: String,
    pub poll_interval: Duration,
    pub drain_timeout: Duration,
}

impl<'a> PipelineHandle<'a> {
    pub fn new(pipeline: &'a dyn IndexingPipeline, config: &PipelineConfig) -> Self {
        Self {
            pipeline,
            queue_table: config.queue_table.clone(),
            poll_interval: config.poll_interval(),
            drain_timeout: config.drain_timeout(),
        }
    }
}

/// Everything a step may need besides its connection.
#[derive(Default)]
pub struct MigrationEnv<'a> {
    pub tenants: Vec<Tenant>,
    pub layout: HierarchyLayout,
    pub scheme: PartitionScheme,
    pub pipeline: Option<PipelineHandle<'a>>,
}

pub struct MigrationContext<'a> {
    pub conn: &'a Connection,
    pub env: &'a MigrationEnv<'a>,
}

impl<'a> MigrationContext<'a> {
    pub fn tenants(&self) -> &[Tenant] {
        &self.env.tenants
    }

    /// Resolver over this step's connection with a cache that lives as long
    /// as the returned value.
    pub fn cached_resolver(&self) -> PathResolver<CachedLookup<SqliteHierarchy<'a>>> {
        PathResolver::with_layout(
            CachedLookup::new(SqliteHierarchy::new(self.conn)),
            self.env.layout,
            self.env.scheme,
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepStatus {
    pub version: u32,
    pub name: &'static str,
    pub applied: bool,
    pub applied_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub current_version: u32,
    pub latest_version: u32,
    pub steps: Vec<StepStatus>,
}

pub struct Migrator {
    steps: Vec<Box<dyn MigrationStep>>,
}

impl Migrator {
    /// Orders `steps` by version and rejects zero or duplicate versions.
    pub fn new(mut steps: Vec<Box<dyn MigrationStep>>) -> Result<Self> {
        steps.sort_by_key(|s| s.version());

        if let Some(step) = steps.iter().find(|s| s.version() == 0) {
            return Err(MigratorError::Migration(format!(
                "step {} has version 0",
                step.name()
            )));
        }
        for pair in steps.windows(2) {
            if pair[0].version() == pair[1].version() {
                return Err(MigratorError::Migration(format!(
                    "steps {} and {} share version {}",
                    pair[0].name(),
                    pair[1].name(),
                    pair[0].version()
                )));
            }
        }

        Ok(Self { steps })
    }

    /// Migrator with the built-in steps.
    pub fn builtin() -> Result<Self> {
        Self::new(steps::builtin_steps())
    }

    pub fn latest_version(&self) -> u32 {
        self.steps.last().map(|s| s.version()).unwrap_or(0)
    }

    pub fn steps(&self) -> impl Iterator<Item = &dyn MigrationStep> {
        self.steps.iter().map(|s| s.as_ref())
    }

    pub fn status(&self, conn: &Connection) -> Result<MigrationStatus> {
        let current_version = get_schema_version(conn)?;
        let mut steps = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let applied_at = applied_at(conn, step.version())?;
            steps.push(StepStatus {
                version: step.version(),
                name: step.name(),
                applied: step.version() <= current_version,
                applied_at,
            });
        }
        Ok(MigrationStatus {
            current_version,
            latest_version: self.latest_version(),
            steps,
        })
    }

    /// Applies pending steps up to `target` (default: latest). Returns the
    /// versions applied.
    pub fn migrate(
        &self,
        conn: &mut Connection,
        env: &MigrationEnv<'_>,
        target: Option<u32>,
    ) -> Result<Vec<u32>> {
        let current = self.checked_version(conn)?;
        let target = target.unwrap_or_else(|| self.latest_version());
        self.check_target(target)?;
        if target < current {
            return Err(MigratorError::Migration(format!(
                "target version {} is below the current version {}; use rollback",
                target, current
            )));
        }

        let mut applied = Vec::new();
        for step in self
            .steps
            .iter()
            .filter(|s| s.version() > current && s.version() <= target)
        {
            info!(version = step.version(), name = step.name(), "applying migration");
            if step.transactional() {
                let tx = conn.transaction()?;
                step.run(&MigrationContext { conn: &tx, env })?;
                record_applied(&tx, step.as_ref())?;
                tx.commit()?;
            } else {
                step.run(&MigrationContext { conn: &*conn, env })?;
                let tx = conn.transaction()?;
                record_applied(&tx, step.as_ref())?;
                tx.commit()?;
            }
            applied.push(step.version());
        }

        info!(from = current, to = target, steps = applied.len(), "migration finished");
        Ok(applied)
    }

    /// Rolls back applied steps above `target`, newest first. Returns the
    /// versions rolled back.
    pub fn rollback(
        &self,
        conn: &mut Connection,
        env: &MigrationEnv<'_>,
        target: u32,
    ) -> Result<Vec<u32>> {
        let current = self.checked_version(conn)?;
        self.check_target(target)?;
        if target > current {
            return Err(MigratorError::Migration(format!(
                "rollback target {} is above the current version {}",
                target, current
            )));
        }

        let mut rolled_back = Vec::new();
        for (idx, step) in self.steps.iter().enumerate().rev() {
            if step.version() <= target || step.version() > current {
                continue;
            }
            let previous = if idx == 0 {
                0
            } else {
                self.steps[idx - 1].version()
            };

            info!(version = step.version(), name = step.name(), "rolling back migration");
            if step.transactional() {
                let tx = conn.transaction()?;
                step.rollback(&MigrationContext { conn: &tx, env })?;
                record_rolled_back(&tx, step.as_ref(), previous)?;
                tx.commit()?;
            } else {
                step.rollback(&MigrationContext { conn: &*conn, env })?;
                let tx = conn.transaction()?;
                record_rolled_back(&tx, step.as_ref(), previous)?;
                tx.commit()?;
            }
            rolled_back.push(step.version());
        }

        info!(from = current, to = target, steps = rolled_back.len(), "rollback finished");
        Ok(rolled_back)
    }

    fn checked_version(&self, conn: &Connection) -> Result<u32> {
        let current = get_schema_version(conn)?;
        if current > self.latest_version() {
            return Err(MigratorError::Migration(format!(
                "store schema version {} is newer than this binary ({}). Please upgrade tenant-migrator.",
                current,
                self.latest_version()
            )));
        }
        Ok(current)
    }

    fn check_target(&self, target: u32) -> Result<()> {
        if target != 0 && !self.steps.iter().any(|s| s.version() == target) {
            return Err(MigratorError::Migration(format!(
                "unknown target version {}",
                target
            )));
        }
        Ok(())
    }
}

/// Gets the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> Result<u32> {
    ensure_bookkeeping(conn)?;

    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match version {
        Some(v) => v.parse().map_err(|_| {
            MigratorError::Migration(format!("schema_version {:?} is not a number", v))
        }),
        None => Ok(0),
    }
}

fn ensure_bookkeeping(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS migration_history (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// Sets the schema version in the database.
fn set_schema_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
        [version.to_string()],
    )?;
    Ok(())
}

fn record_applied(conn: &Connection, step: &dyn MigrationStep) -> Result<()> {
    ensure_bookkeeping(conn)?;
    conn.execute(
        "INSERT OR REPLACE INTO migration_history (version, name, applied_at) VALUES (?1, ?2, ?3)",
        params![step.version(), step.name(), unix_now()],
    )?;
    set_schema_version(conn, step.version())
}

fn record_rolled_back(conn: &Connection, step: &dyn MigrationStep, previous: u32) -> Result<()> {
    conn.execute(
        "DELETE FROM migration_history WHERE version = ?1",
        [step.version()],
    )?;
    set_schema_version(conn, previous)
}

fn applied_at(conn: &Connection, version: u32) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT applied_at FROM migration_history WHERE version = ?1",
            [version],
            |row| row.get(0),
        )
        .optional()?)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Checks if a column exists in a table.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Checks if a table exists.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Creates and drops one table per version.
    struct TableStep {
        version: u32,
        fail_run: bool,
    }

    impl MigrationStep for TableStep {
        fn version(&self) -> u32 {
            self.version
        }

        fn name(&self) -> &'static str {
            "table_step"
        }

        fn run(&self, ctx: &MigrationContext<'_>) -> Result<()> {
            ctx.conn
                .execute_batch(&format!("CREATE TABLE t{} (x INTEGER);", self.version))?;
            if self.fail_run {
                return Err(MigratorError::Migration("boom".into()));
            }
            Ok(())
        }

        fn rollback(&self, ctx: &MigrationContext<'_>) -> Result<()> {
            ctx.conn
                .execute_batch(&format!("DROP TABLE t{};", self.version))?;
            Ok(())
        }
    }

    fn step(version: u32) -> Box<dyn MigrationStep> {
        Box::new(TableStep {
            version,
            fail_run: false,
        })
    }

    fn migrator(versions: &[u32]) -> Migrator {
        Migrator::new(versions.iter().map(|v| step(*v)).collect()).unwrap()
    }

    #[test]
    fn test_rejects_duplicate_and_zero_versions() {
        assert!(Migrator::new(vec![step(1), step(2), step(1)]).is_err());
        assert!(Migrator::new(vec![step(0)]).is_err());
    }

    #[test]
    fn test_migrate_applies_in_version_order() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = migrator(&[3, 1, 2]);
        let env = MigrationEnv::default();

        let applied = migrator.migrate(&mut conn, &env, None).unwrap();
        assert_eq!(applied, vec![1, 2, 3]);
        assert_eq!(get_schema_version(&conn).unwrap(), 3);
        for table in ["t1", "t2", "t3"] {
            assert!(table_exists(&conn, table).unwrap());
        }

        // Second run is a no-op
        assert!(migrator.migrate(&mut conn, &env, None).unwrap().is_empty());
    }

    #[test]
    fn test_migrate_to_target_then_rollback() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = migrator(&[1, 2, 5]);
        let env = MigrationEnv::default();

        assert_eq!(migrator.migrate(&mut conn, &env, Some(2)).unwrap(), vec![1, 2]);
        assert!(!table_exists(&conn, "t5").unwrap());

        migrator.migrate(&mut conn, &env, None).unwrap();
        assert_eq!(migrator.rollback(&mut conn, &env, 1).unwrap(), vec![5, 2]);
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
        assert!(table_exists(&conn, "t1").unwrap());
        assert!(!table_exists(&conn, "t2").unwrap());

        let status = migrator.status(&conn).unwrap();
        assert_eq!(status.current_version, 1);
        assert!(status.steps[0].applied && status.steps[0].applied_at.is_some());
        assert!(!status.steps[1].applied && status.steps[1].applied_at.is_none());

        assert_eq!(migrator.rollback(&mut conn, &env, 0).unwrap(), vec![1]);
        assert_eq!(get_schema_version(&conn).unwrap(), 0);
    }

    #[test]
    fn test_rejects_bad_targets() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = migrator(&[1, 2]);
        let env = MigrationEnv::default();

        assert!(migrator.migrate(&mut conn, &env, Some(7)).is_err());
        migrator.migrate(&mut conn, &env, Some(1)).unwrap();
        assert!(migrator.rollback(&mut conn, &env, 2).is_err());
        migrator.migrate(&mut conn, &env, None).unwrap();
        assert!(migrator.migrate(&mut conn, &env, Some(1)).is_err());
    }

    #[test]
    fn test_failed_step_is_rolled_back() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new(vec![
            step(1),
            Box::new(TableStep {
                version: 2,
                fail_run: true,
            }),
        ])
        .unwrap();
        let env = MigrationEnv::default();

        assert!(migrator.migrate(&mut conn, &env, None).is_err());
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
        assert!(table_exists(&conn, "t1").unwrap());
        assert!(!table_exists(&conn, "t2").unwrap());
    }

    #[test]
    fn test_refuses_newer_store() {
        let mut conn = Connection::open_in_memory().unwrap();
        let env = MigrationEnv::default();
        migrator(&[1, 2]).migrate(&mut conn, &env, None).unwrap();

        let older = migrator(&[1]);
        let err = older.migrate(&mut conn, &env, None).unwrap_err();
        assert!(err.to_string().contains("newer than this binary"));
    }

    #[test]
    fn test_column_exists() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE dataset (id INTEGER, path TEXT);")
            .unwrap();
        assert!(column_exists(&conn, "dataset", "path").unwrap());
        assert!(!column_exists(&conn, "dataset", "inode_id").unwrap());
        assert!(!column_exists(&conn, "missing", "path").unwrap());
    }
}
