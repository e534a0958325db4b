//! Partition key derivation for the inode table.
//!
//! The metadata writer co-locates rows by a partition key computed from the
//! parent id, the entry name and the entry depth. Lookups by
//! `(parent_id, name, partition_id)` only hit if the key is rebuilt exactly
//! the way the writer built it, so this module is a fixed contract:
//!
//! - levels up to `random_partitioning_max_level` are hashed
//!   (`hash(name ++ parent_id)`, Java `String::hashCode` semantics),
//!   except depth 0 which always maps to [`ROOT_DIR_PARTITION_KEY`];
//! - deeper levels use the parent id, so siblings share a partition.

use serde::{Deserialize, Serialize};

/// Partition key of the filesystem root directory itself.
pub const ROOT_DIR_PARTITION_KEY: i64 = 0;

/// Depth of the filesystem root directory.
pub const ROOT_DIR_DEPTH: u32 = 0;

/// Deepest level whose entries are spread by hash instead of by parent.
pub const DEFAULT_RANDOM_PARTITIONING_MAX_LEVEL: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionScheme {
    pub random_partitioning_max_level: u32,
}

impl Default for PartitionScheme {
    fn default() -> Self {
        Self {
            random_partitioning_max_level: DEFAULT_RANDOM_PARTITIONING_MAX_LEVEL,
        }
    }
}

impl PartitionScheme {
    pub fn new(random_partitioning_max_level: u32) -> Self {
        Self {
            random_partitioning_max_level,
        }
    }

    /// Derives the partition key for an entry named `name` under `parent_id`
    /// at `depth` (the filesystem root is depth 0).
    pub fn derive(&self, parent_id: i64, name: &str, depth: u32) -> i64 {
        if self.is_randomly_partitioned(depth) {
            Self::hash_partition(parent_id, name, depth)
        } else {
            parent_id
        }
    }

    pub fn is_randomly_partitioned(&self, depth: u32) -> bool {
        depth <= self.random_partitioning_max_level
    }

    fn hash_partition(parent_id: i64, name: &str, depth: u32) -> i64 {
        if depth == ROOT_DIR_DEPTH {
            return ROOT_DIR_PARTITION_KEY;
        }
        i64::from(java_string_hash(&format!("{}{}", name, parent_id)))
    }
}

/// Derives a partition key with the default scheme.
pub fn derive(parent_id: i64, name: &str, depth: u32) -> i64 {
    PartitionScheme::default().derive(parent_id, name, depth)
}

/// Java `String::hashCode` over UTF-16 code units.
pub fn java_string_hash(value: &str) -> i32 {
    value
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}
