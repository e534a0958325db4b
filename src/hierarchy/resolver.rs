//! Path resolution over the partitioned inode table.
//!
//! The table has no recursive query support, so a path is resolved by
//! descending one segment at a time. Every step rebuilds the partition key
//! from the current node's id, the next segment and its depth counted from
//! the true root, then issues one point lookup. The first miss ends the
//! walk.

use tracing::debug;

use crate::error::{MigratorError, Result};
use crate::hierarchy::{
    HierarchyLayout, HierarchyLookup, HierarchyPath, Node, NodeKey, PartitionScheme,
};

/// Upper bound on parent links followed by [`PathResolver::path_of`].
pub const MAX_PATH_DEPTH: usize = 4096;

pub struct PathResolver<L> {
    lookup: L,
    layout: HierarchyLayout,
    scheme: PartitionScheme,
}

impl<L: HierarchyLookup> PathResolver<L> {
    /// Creates a resolver with the default layout and partition scheme.
    pub fn new(lookup: L) -> Self {
        Self::with_layout(lookup, HierarchyLayout::default(), PartitionScheme::default())
    }

    pub fn with_layout(lookup: L, layout: HierarchyLayout, scheme: PartitionScheme) -> Self {
        Self {
            lookup,
            layout,
            scheme,
        }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    pub fn layout(&self) -> HierarchyLayout {
        self.layout
    }

    /// Resolves a path (`/p/a`, `scheme://host:port/p/a`, `p/a`) or a bare
    /// root name to its inode.
    ///
    /// Returns `Ok(None)` when the path has no segments or any segment is
    /// missing. Ambiguous lookups and storage failures are returned as errors.
    pub fn resolve(&self, path: &str) -> Result<Option<Node>> {
        self.resolve_segments(&HierarchyPath::parse(path))
    }

    /// Looks up a top-level entry by name. The name is not split.
    pub fn resolve_root(&self, name: &str) -> Result<Option<Node>> {
        let parent_id = self.layout.root_parent_id;
        let partition_id = self.scheme.derive(parent_id, name, self.layout.root_depth);
        self.lookup
            .find_by_key(&NodeKey::new(parent_id, name, partition_id))
    }

    pub fn resolve_segments(&self, path: &HierarchyPath) -> Result<Option<Node>> {
        let Some((root, rest)) = path.segments().split_first() else {
            return Ok(None);
        };

        let Some(mut current) = self.resolve_root(root)? else {
            debug!(root = %root, "root entry not found");
            return Ok(None);
        };

        for (i, segment) in rest.iter().enumerate() {
            let depth = u32::try_from(i)
                .ok()
                .and_then(|i| self.layout.root_depth.checked_add(i))
                .and_then(|d| d.checked_add(1))
                .ok_or_else(|| {
                    MigratorError::Hierarchy(format!(
                        "depth overflow below root depth {}",
                        self.layout.root_depth
                    ))
                })?;
            match self.child(&current, segment, depth)? {
                Some(node) => current = node,
                None => {
                    debug!(
                        parent_id = current.id,
                        segment = %segment,
                        depth,
                        "path segment not found"
                    );
                    return Ok(None);
                }
            }
        }

        Ok(Some(current))
    }

    /// Looks up the child `name` of `parent`, where `depth` is the child's
    /// depth from the filesystem root.
    pub fn child(&self, parent: &Node, name: &str, depth: u32) -> Result<Option<Node>> {
        let partition_id = self.scheme.derive(parent.id, name, depth);
        self.lookup
            .find_by_key(&NodeKey::new(parent.id, name, partition_id))
    }

    /// Rebuilds the absolute path of an inode by following parent links up to
    /// the root parent.
    ///
    /// Returns `Ok(None)` if the inode or one of its ancestors is missing.
    pub fn path_of(&self, id: i64) -> Result<Option<String>> {
        let mut names = Vec::new();
        let mut next = id;

        loop {
            if names.len() >= MAX_PATH_DEPTH {
                return Err(MigratorError::Hierarchy(format!(
                    "parent chain of inode {} exceeds {} levels",
                    id, MAX_PATH_DEPTH
                )));
            }
            let Some(node) = self.lookup.find_by_id(next)? else {
                return Ok(None);
            };
            let parent_id = node.parent_id;
            names.push(node.name);
            if parent_id == self.layout.root_parent_id {
                break;
            }
            next = parent_id;
        }

        names.reverse();
        Ok(Some(HierarchyPath::from_segments(names).to_string()))
    }
}
