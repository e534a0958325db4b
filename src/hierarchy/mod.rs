pub mod cache;
pub mod partition;
pub mod path;
pub mod resolver;
pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::error::Result;
pub use cache::CachedLookup;
pub use partition::{derive, PartitionScheme};
pub use path::HierarchyPath;
pub use resolver::PathResolver;
pub use sqlite::SqliteHierarchy;

/// Parent id shared by every top-level entry: the id of the filesystem root
/// directory, which is never itself looked up by path.
pub const ROOT_PARENT_ID: i64 = 1;

/// Depth of top-level entries (the filesystem root sits at depth 0).
pub const ROOT_DEPTH: u32 = 1;

/// Deepest depth the writer can store (a signed 16-bit column).
pub const MAX_INODE_DEPTH: u32 = i16::MAX as u32;

/// One row of the inode table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub partition_id: i64,
    pub is_dir: bool,
    pub size: i64,
}

impl Node {
    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.parent_id, self.name.clone(), self.partition_id)
    }
}

/// Compound point-lookup key of the inode table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub parent_id: i64,
    pub name: String,
    pub partition_id: i64,
}

impl NodeKey {
    pub fn new(parent_id: i64, name: impl Into<String>, partition_id: i64) -> Self {
        Self {
            parent_id,
            name: name.into(),
            partition_id,
        }
    }
}

/// Where top-level entries hang off the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyLayout {
    pub root_parent_id: i64,
    pub root_depth: u32,
}

impl Default for HierarchyLayout {
    fn default() -> Self {
        Self {
            root_parent_id: ROOT_PARENT_ID,
            root_depth: ROOT_DEPTH,
        }
    }
}

/// Point lookups over the inode table.
///
/// A miss is `Ok(None)`. More than one row for a key is an invariant
/// violation and must come back as an ambiguity error, never as one of the
/// rows.
pub trait HierarchyLookup {
    fn find_by_key(&self, key: &NodeKey) -> Result<Option<Node>>;
    fn find_by_id(&self, id: i64) -> Result<Option<Node>>;
}

impl<L: HierarchyLookup + ?Sized> HierarchyLookup for &L {
    fn find_by_key(&self, key: &NodeKey) -> Result<Option<Node>> {
        (**self).find_by_key(key)
    }

    fn find_by_id(&self, id: i64) -> Result<Option<Node>> {
        (**self).find_by_id(id)
    }
}
