//! Scoped memoization of inode key lookups.
//!
//! The inode table is mutated by an external writer, so a cache is only
//! valid for one resolution or one transaction. Create it for that scope and
//! drop it afterwards.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::error::Result;
use crate::hierarchy::{HierarchyLookup, Node, NodeKey};

pub struct CachedLookup<L> {
    inner: L,
    by_key: RefCell<HashMap<NodeKey, Option<Node>>>,
    hits: Cell<u64>,
}

impl<L: HierarchyLookup> CachedLookup<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            by_key: RefCell::new(HashMap::new()),
            hits: Cell::new(0),
        }
    }

    /// Number of lookups answered without touching the store.
    pub fn hits(&self) -> u64 {
        self.hits.get()
    }

    pub fn len(&self) -> usize {
        self.by_key.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.borrow().is_empty()
    }

    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<L: HierarchyLookup> HierarchyLookup for CachedLookup<L> {
    fn find_by_key(&self, key: &NodeKey) -> Result<Option<Node>> {
        if let Some(cached) = self.by_key.borrow().get(key) {
            self.hits.set(self.hits.get() + 1);
            return Ok(cached.clone());
        }

        // Errors (ambiguity included) are returned without being remembered.
        let found = self.inner.find_by_key(key)?;
        self.by_key.borrow_mut().insert(key.clone(), found.clone());
        Ok(found)
    }

    fn find_by_id(&self, id: i64) -> Result<Option<Node>> {
        self.inner.find_by_id(id)
    }
}
