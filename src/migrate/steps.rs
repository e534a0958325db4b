//! Built-in migration steps.
//!
//! The platform tables `project(id, name)` and `dataset(id, project_id,
//! name, path)` are owned by the platform and assumed to exist; these steps
//! only extend and backfill them.

use rusqlite::params;
use tracing::{info, warn};

use crate::db::validate_identifier;
use crate::error::Result;
use crate::migrate::{column_exists, MigrationContext, MigrationStep};
use crate::pipeline::{wait_for_drain, IndexingPipeline, SqlQueueProbe};

pub fn builtin_steps() -> Vec<Box<dyn MigrationStep>> {
    vec![
        Box::new(DatasetInodeColumns),
        Box::new(DatasetInodeBackfill),
        Box::new(TenantSql::new(
            3,
            "tenant_activity_tables",
            TENANT_ACTIVITY_UP,
            TENANT_ACTIVITY_DOWN,
        )),
        Box::new(HierarchyReindex),
    ]
}

const INODE_COLUMNS: [&str; 3] = ["inode_id", "inode_parent_id", "inode_partition_id"];

/// V1: inode reference columns on `dataset`.
pub struct DatasetInodeColumns;

impl MigrationStep for DatasetInodeColumns {
    fn version(&self) -> u32 {
        1
    }

    fn name(&self) -> &'static str {
        "dataset_inode_columns"
    }

    fn run(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        for column in INODE_COLUMNS {
            if !column_exists(ctx.conn, "dataset", column)? {
                ctx.conn.execute_batch(&format!(
                    "ALTER TABLE dataset ADD COLUMN {} INTEGER",
                    column
                ))?;
            }
        }
        ctx.conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_dataset_inode ON dataset(inode_id);",
        )?;
        Ok(())
    }

    fn rollback(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        ctx.conn
            .execute_batch("DROP INDEX IF EXISTS idx_dataset_inode;")?;
        for column in INODE_COLUMNS {
            if column_exists(ctx.conn, "dataset", column)? {
                ctx.conn
                    .execute_batch(&format!("ALTER TABLE dataset DROP COLUMN {}", column))?;
            }
        }
        Ok(())
    }
}

/// V2: fills the inode columns by resolving each dataset's path.
///
/// Paths that do not resolve are logged and left NULL. An ambiguous lookup
/// fails the step.
pub struct DatasetInodeBackfill;

impl MigrationStep for DatasetInodeBackfill {
    fn version(&self) -> u32 {
        2
    }

    fn name(&self) -> &'static str {
        "dataset_inode_backfill"
    }

    fn run(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let datasets: Vec<(i64, String)> = {
            let mut stmt = ctx.conn.prepare("SELECT id, path FROM dataset ORDER BY id")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let resolver = ctx.cached_resolver();
        let mut unresolved = 0usize;

        for (id, path) in &datasets {
            match resolver.resolve(path)? {
                Some(node) => {
                    ctx.conn.execute(
                        r#"
                        UPDATE dataset
                        SET inode_id = ?1, inode_parent_id = ?2, inode_partition_id = ?3
                        WHERE id = ?4
                        "#,
                        params![node.id, node.parent_id, node.partition_id, id],
                    )?;
                }
                None => {
                    warn!(dataset_id = id, path = %path, "dataset path not found in inode table");
                    unresolved += 1;
                }
            }
        }

        info!(
            datasets = datasets.len(),
            unresolved,
            cache_hits = resolver.lookup().hits(),
            "dataset inode backfill done"
        );
        Ok(())
    }

    fn rollback(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        ctx.conn.execute(
            "UPDATE dataset SET inode_id = NULL, inode_parent_id = NULL, inode_partition_id = NULL",
            [],
        )?;
        Ok(())
    }
}

const TENANT_ACTIVITY_UP: &str = r#"
CREATE TABLE IF NOT EXISTS "{tenant}_activity" (
    id INTEGER PRIMARY KEY,
    inode_id INTEGER,
    user TEXT NOT NULL,
    action TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS "idx_{tenant}_activity_inode" ON "{tenant}_activity"(inode_id);
"#;

const TENANT_ACTIVITY_DOWN: &str = r#"
DROP INDEX IF EXISTS "idx_{tenant}_activity_inode";
DROP TABLE IF EXISTS "{tenant}_activity";
"#;

/// Fixed SQL run once per tenant, with `{tenant}` replaced by the tenant
/// name.
pub struct TenantSql {
    version: u32,
    name: &'static str,
    up: &'static str,
    down: &'static str,
}

impl TenantSql {
    pub const fn new(version: u32, name: &'static str, up: &'static str, down: &'static str) -> Self {
        Self {
            version,
            name,
            up,
            down,
        }
    }

    fn apply(&self, ctx: &MigrationContext<'_>, template: &str) -> Result<()> {
        for tenant in ctx.tenants() {
            validate_identifier(&tenant.name)?;
            ctx.conn
                .execute_batch(&template.replace("{tenant}", &tenant.name))?;
        }
        Ok(())
    }
}

impl MigrationStep for TenantSql {
    fn version(&self) -> u32 {
        self.version
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        self.apply(ctx, self.up)
    }

    fn rollback(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        self.apply(ctx, self.down)
    }
}

/// V4: full reindex of the hierarchy by the indexing pipeline.
///
/// Runs outside a transaction: the drain wait has to see the pipeline's
/// deletes from the queue table.
pub struct HierarchyReindex;

impl MigrationStep for HierarchyReindex {
    fn version(&self) -> u32 {
        4
    }

    fn name(&self) -> &'static str {
        "hierarchy_reindex"
    }

    fn transactional(&self) -> bool {
        false
    }

    fn run(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let Some(handle) = &ctx.env.pipeline else {
            warn!("no indexing pipeline configured, skipping reindex");
            return Ok(());
        };
        let probe = SqlQueueProbe::new(ctx.conn, &handle.queue_table)?;

        handle.pipeline.stop()?;

        let reindexed = handle
            .pipeline
            .set_reindex(true)
            .and_then(|()| handle.pipeline.start())
            .and_then(|()| wait_for_drain(&probe, handle.poll_interval, handle.drain_timeout));

        // back to normal mode whether or not the reindex went through
        let restored = restore_normal_mode(handle.pipeline);
        reindexed.and(restored)
    }

    fn rollback(&self, _ctx: &MigrationContext<'_>) -> Result<()> {
        info!("reindex has nothing to roll back");
        Ok(())
    }
}

/// Stops the pipeline, clears the reindex flag and starts it again. Every
/// call is attempted; the first error is returned.
fn restore_normal_mode(pipeline: &dyn IndexingPipeline) -> Result<()> {
    let results = [
        pipeline.stop(),
        pipeline.set_reindex(false),
        pipeline.start(),
    ];
    for result in &results {
        if let Err(e) = result {
            warn!(error = %e, "failed to restore indexing pipeline");
        }
    }
    results.into_iter().collect()
}
