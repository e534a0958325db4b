//! Integration tests for path resolution against a SQLite inode table.

use std::cell::Cell;

use rusqlite::{params, Connection};
use tempfile::TempDir;

use tenant_migrator::hierarchy::sqlite::create_inode_table;
use tenant_migrator::{
    derive, ConnectionFactory, HierarchyLookup, MigratorError, Node, NodeKey, PathResolver,
    SqliteHierarchy, ROOT_PARENT_ID,
};

/// Inserts an inode the way the metadata writer does, deriving its key.
fn insert_inode(conn: &Connection, id: i64, parent_id: i64, name: &str, depth: u32) {
    conn.execute(
        "INSERT INTO inodes (id, parent_id, name, partition_id, is_dir, size) VALUES (?1, ?2, ?3, ?4, 1, 0)",
        params![id, parent_id, name, derive(parent_id, name, depth)],
    )
    .expect("Failed to insert inode");
}

/// proj1 -> a -> b -> c, plus an empty proj2.
fn create_tree() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to open database");
    create_inode_table(&conn).expect("Failed to create inode table");
    insert_inode(&conn, 100, ROOT_PARENT_ID, "proj1", 1);
    insert_inode(&conn, 101, 100, "a", 2);
    insert_inode(&conn, 102, 101, "b", 3);
    insert_inode(&conn, 103, 102, "c", 4);
    insert_inode(&conn, 200, ROOT_PARENT_ID, "proj2", 1);
    conn
}

/// Wraps a lookup and counts key lookups.
struct CountingLookup<L> {
    inner: L,
    key_lookups: Cell<usize>,
}

impl<L: HierarchyLookup> HierarchyLookup for CountingLookup<L> {
    fn find_by_key(&self, key: &NodeKey) -> tenant_migrator::Result<Option<Node>> {
        self.key_lookups.set(self.key_lookups.get() + 1);
        self.inner.find_by_key(key)
    }

    fn find_by_id(&self, id: i64) -> tenant_migrator::Result<Option<Node>> {
        self.inner.find_by_id(id)
    }
}

// ============================================================================
// Shapes of input
// ============================================================================

mod path_shapes {
    use super::*;

    #[test]
    fn test_empty_and_slash_are_not_found() {
        let conn = create_tree();
        let resolver = PathResolver::new(SqliteHierarchy::new(&conn));
        assert!(resolver.resolve("").unwrap().is_none());
        assert!(resolver.resolve("/").unwrap().is_none());
    }

    #[test]
    fn test_root_without_children() {
        let conn = create_tree();
        let resolver = PathResolver::new(SqliteHierarchy::new(&conn));

        let root = resolver.resolve("proj2").unwrap().expect("proj2 should resolve");
        assert_eq!(root.id, 200);
        assert_eq!(root.partition_id, derive(ROOT_PARENT_ID, "proj2", 1));
        assert!(resolver.resolve("/proj2/missing").unwrap().is_none());
    }

    #[test]
    fn test_nested_path() {
        let conn = create_tree();
        let resolver = PathResolver::new(SqliteHierarchy::new(&conn));
        let node = resolver.resolve("/proj1/a/b").unwrap().expect("b should resolve");
        assert_eq!(node.id, 102);
        assert_eq!(node.name, "b");
        assert_eq!(node.partition_id, derive(101, "b", 3));
    }

    #[test]
    fn test_scheme_prefix_matches_absolute() {
        let conn = create_tree();
        let resolver = PathResolver::new(SqliteHierarchy::new(&conn));
        let prefixed = resolver.resolve("scheme://host:1234/proj1/a").unwrap();
        let absolute = resolver.resolve("/proj1/a").unwrap();
        assert_eq!(prefixed, absolute);
        assert_eq!(prefixed.map(|n| n.id), Some(101));
    }

    #[test]
    fn test_trailing_slash_and_relative_form() {
        let conn = create_tree();
        let resolver = PathResolver::new(SqliteHierarchy::new(&conn));
        assert_eq!(resolver.resolve("/proj1/a/b/c/").unwrap().map(|n| n.id), Some(103));
        assert_eq!(resolver.resolve("proj1/a/b/c").unwrap().map(|n| n.id), Some(103));
        assert!(resolver.resolve("/proj1//a").unwrap().is_none());
    }

    #[test]
    fn test_resolve_root_does_not_split() {
        let conn = create_tree();
        let resolver = PathResolver::new(SqliteHierarchy::new(&conn));
        assert!(resolver.resolve_root("proj1/a").unwrap().is_none());
        assert_eq!(resolver.resolve_root("proj1").unwrap().map(|n| n.id), Some(100));
    }
}

// ============================================================================
// Lookup behavior
// ============================================================================

mod lookups {
    use super::*;

    #[test]
    fn test_descent_stops_at_first_miss() {
        let conn = create_tree();
        let counting = CountingLookup {
            inner: SqliteHierarchy::new(&conn),
            key_lookups: Cell::new(0),
        };
        let resolver = PathResolver::new(counting);

        // miss at segment 2 of 5: root + "a" + "x", then nothing else
        assert!(resolver.resolve("/proj1/a/x/c/d").unwrap().is_none());
        assert_eq!(resolver.lookup().key_lookups.get(), 3);
    }

    #[test]
    fn test_duplicate_rows_raise_ambiguity() {
        let conn = create_tree();
        insert_inode(&conn, 104, 100, "a", 2);
        let resolver = PathResolver::new(SqliteHierarchy::new(&conn));

        let err = resolver.resolve("/proj1/a/b").unwrap_err();
        match err {
            MigratorError::ResolutionAmbiguous {
                parent_id,
                ref name,
                partition_id,
                rows,
            } => {
                assert_eq!(parent_id, 100);
                assert_eq!(name, "a");
                assert_eq!(partition_id, derive(100, "a", 2));
                assert_eq!(rows, 2);
            }
            other => panic!("expected ambiguity, got {other}"),
        }
    }

    #[test]
    fn test_path_of_matches_resolve() {
        let conn = create_tree();
        let resolver = PathResolver::new(SqliteHierarchy::new(&conn));
        let path = resolver.path_of(103).unwrap().expect("103 should have a path");
        assert_eq!(path, "/proj1/a/b/c");
        assert_eq!(resolver.resolve(&path).unwrap().map(|n| n.id), Some(103));
    }

    #[test]
    fn test_missing_table_surfaces_storage_error() {
        let conn = Connection::open_in_memory().unwrap();
        let resolver = PathResolver::new(SqliteHierarchy::new(&conn));
        let err = resolver.resolve("/proj1").unwrap_err();
        assert!(err.is_storage_error());
    }

    #[test]
    fn test_concurrent_resolutions_use_own_connections() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let factory = ConnectionFactory::open(temp_dir.path().join("meta.db"), 4).unwrap();
        {
            let conn = factory.acquire().unwrap();
            create_inode_table(&conn).unwrap();
            insert_inode(&conn, 100, ROOT_PARENT_ID, "proj1", 1);
            insert_inode(&conn, 101, 100, "a", 2);
        }

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let conn = factory.acquire().unwrap();
                    let resolver = PathResolver::new(SqliteHierarchy::new(&conn));
                    for _ in 0..25 {
                        let node = resolver.resolve("/proj1/a").unwrap().unwrap();
                        assert_eq!(node.id, 101);
                    }
                });
            }
        });
    }
}
