use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::{MigratorError, Result};
use crate::hierarchy::{HierarchyLookup, Node, NodeKey};

/// Point lookups against the `inodes` table over one borrowed connection.
///
/// Statements go through the connection's statement cache on every call, so
/// the lookup keeps no handles of its own and works equally on a pooled
/// connection or inside a migration transaction.
pub struct SqliteHierarchy<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteHierarchy<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn node_from_row(row: &rusqlite::Row) -> rusqlite::Result<Node> {
        Ok(Node {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            name: row.get(2)?,
            partition_id: row.get(3)?,
            is_dir: row.get::<_, i64>(4)? != 0,
            size: row.get(5)?,
        })
    }
}

impl HierarchyLookup for SqliteHierarchy<'_> {
    fn find_by_key(&self, key: &NodeKey) -> Result<Option<Node>> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT id, parent_id, name, partition_id, is_dir, size
            FROM inodes
            WHERE partition_id = ?1 AND parent_id = ?2 AND name = ?3
            "#,
        )?;

        let mut rows = stmt
            .query_map(
                params![key.partition_id, key.parent_id, key.name],
                Self::node_from_row,
            )?
            .take(2)
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(
            parent_id = key.parent_id,
            name = %key.name,
            partition_id = key.partition_id,
            rows = rows.len(),
            "inode key lookup"
        );

        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(MigratorError::ResolutionAmbiguous {
                parent_id: key.parent_id,
                name: key.name.clone(),
                partition_id: key.partition_id,
                rows: n,
            }),
        }
    }

    fn find_by_id(&self, id: i64) -> Result<Option<Node>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, parent_id, name, partition_id, is_dir, size FROM inodes WHERE id = ?1",
        )?;

        let mut rows = stmt
            .query_map(params![id], Self::node_from_row)?
            .take(2)
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(id, rows = rows.len(), "inode id lookup");

        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(MigratorError::AmbiguousId { id, rows: n }),
        }
    }
}

/// Creates the inode table with the writer's column layout.
///
/// The lookup index is deliberately non-unique: sibling uniqueness belongs to
/// the writer, and fixtures need to be able to reproduce a corrupted store.
pub fn create_inode_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS inodes (
            id INTEGER NOT NULL,
            parent_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            partition_id INTEGER NOT NULL,
            is_dir INTEGER NOT NULL DEFAULT 1,
            size INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_inodes_lookup ON inodes(partition_id, parent_id, name);
        CREATE INDEX IF NOT EXISTS idx_inodes_id ON inodes(id);
        "#,
    )?;
    Ok(())
}
