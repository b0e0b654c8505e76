//! Per-instance node table.
//!
//! A generational arena: nodes live in slots addressed by [`NodeIndex`],
//! freed slots are reused with a bumped generation so stale indices fail
//! instead of aliasing a newer node. Parent, child and root links are all
//! indices into this table.
//!
//! The table has no lock of its own; the owning instance's lock guards it.

use std::collections::HashMap;

use super::error::{VfsError, VfsResult};
use super::node::{Node, Stream};
use super::types::{NodeId, NodeIndex};

struct Slot<F> {
    generation: u32,
    node: Option<Node<F>>,
}

/// Node storage for one instance.
pub struct NodeTable<F> {
    slots: Vec<Slot<F>>,
    free: Vec<u32>,
    by_id: HashMap<NodeId, NodeIndex>,
    next_id: u64,
    limit: Option<usize>,
}

impl<F> Default for NodeTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> NodeTable<F> {
    /// Create an empty, unbounded table.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_id: HashMap::new(),
            next_id: 1,
            limit: None,
        }
    }

    /// Create a table that refuses to grow past `limit` live nodes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Allocate a fresh, unlinked node.
    ///
    /// Allocation failure (the node limit) is the only error.
    pub fn create(&mut self, name: impl Into<String>, stream: Stream<F>) -> VfsResult<Node<F>> {
        if self.limit.is_some_and(|limit| self.len() >= limit) {
            return Err(VfsError::OutOfMemory);
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        Ok(Node::new(id, name.into(), stream))
    }

    /// Store a node, returning its index.
    pub fn insert(&mut self, node: Node<F>) -> NodeIndex {
        let id = node.id;
        let index = match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                entry.node = Some(node);
                NodeIndex {
                    slot,
                    generation: entry.generation,
                }
            }
            None => {
                let slot = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeIndex {
                    slot,
                    generation: 0,
                }
            }
        };
        self.by_id.insert(id, index);
        index
    }

    /// Take a node out of the table, freeing its slot.
    ///
    /// Performs no link checks; see [`NodeTable::delete`].
    pub fn remove(&mut self, index: NodeIndex) -> Option<Node<F>> {
        let entry = self.slots.get_mut(index.slot as usize)?;
        if entry.generation != index.generation {
            return None;
        }
        let node = entry.node.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index.slot);
        self.by_id.remove(&node.id);
        Some(node)
    }

    pub fn contains(&self, index: NodeIndex) -> bool {
        self.get(index).is_ok()
    }

    pub fn get(&self, index: NodeIndex) -> VfsResult<&Node<F>> {
        self.slots
            .get(index.slot as usize)
            .filter(|entry| entry.generation == index.generation)
            .and_then(|entry| entry.node.as_ref())
            .ok_or(VfsError::StaleHandle)
    }

    pub fn get_mut(&mut self, index: NodeIndex) -> VfsResult<&mut Node<F>> {
        self.slots
            .get_mut(index.slot as usize)
            .filter(|entry| entry.generation == index.generation)
            .and_then(|entry| entry.node.as_mut())
            .ok_or(VfsError::StaleHandle)
    }

    /// Look up a node by id.
    pub fn find_id(&self, id: NodeId) -> Option<NodeIndex> {
        self.by_id.get(&id).copied()
    }

    /// Visit every live node, in unspecified order.
    pub fn for_each(&self, mut f: impl FnMut(NodeIndex, &Node<F>)) {
        for (slot, entry) in self.slots.iter().enumerate() {
            if let Some(node) = &entry.node {
                let index = NodeIndex {
                    slot: slot as u32,
                    generation: entry.generation,
                };
                f(index, node);
            }
        }
    }

    /// Delete a node.
    ///
    /// Without `force`, the node must have no children and must not be
    /// linked into a parent (the root is its own parent and therefore only
    /// goes away forced).
    pub fn delete(&mut self, index: NodeIndex, force: bool) -> VfsResult<Node<F>> {
        let node = self.get(index)?;
        if !force {
            if !node.children.is_empty() {
                return Err(VfsError::not_allowed(format!(
                    "directory not empty: {} ({} children)",
                    node.id,
                    node.children.len()
                )));
            }
            if node.is_linked() {
                return Err(VfsError::not_allowed(format!(
                    "node {} is still linked into a directory",
                    node.id
                )));
            }
        }
        self.remove(index).ok_or(VfsError::StaleHandle)
    }

    /// Force-delete every node. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let mut indices = Vec::with_capacity(self.len());
        self.for_each(|index, _| indices.push(index));
        let count = indices.len();
        for index in indices {
            let _ = self.delete(index, true);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Table = NodeTable<()>;

    #[test]
    fn test_create_assigns_monotonic_ids() {
        let mut table = Table::new();
        let a = table.create("a", Stream::Directory).unwrap();
        let b = table.create("b", Stream::File(())).unwrap();
        assert!(b.id() > a.id());
        assert!(a.parent().is_none());
        assert_eq!(a.child_count(), 0);
        // Not inserted yet.
        assert!(table.is_empty());
    }

    #[test]
    fn test_insert_remove_tracks_ids() {
        let mut table = Table::new();
        let node = table.create("a", Stream::File(())).unwrap();
        let id = node.id();
        let index = table.insert(node);

        assert_eq!(table.find_id(id), Some(index));
        assert_eq!(table.get(index).unwrap().name(), "a");

        let removed = table.remove(index).unwrap();
        assert_eq!(removed.id(), id);
        assert_eq!(table.find_id(id), None);
        assert!(table.remove(index).is_none());
    }

    #[test]
    fn test_reused_slot_rejects_stale_index() {
        let mut table = Table::new();
        let first = table.create("old", Stream::File(())).unwrap();
        let old = table.insert(first);
        table.remove(old).unwrap();

        let second = table.create("new", Stream::File(())).unwrap();
        let new = table.insert(second);

        assert_eq!(old.slot, new.slot);
        assert!(matches!(table.get(old), Err(VfsError::StaleHandle)));
        assert_eq!(table.get(new).unwrap().name(), "new");
    }

    #[test]
    fn test_limit_reports_out_of_memory() {
        let mut table = Table::with_limit(2);
        let a = table.create("a", Stream::Directory).unwrap();
        table.insert(a);
        let b = table.create("b", Stream::Directory).unwrap();
        table.insert(b);
        assert!(matches!(
            table.create("c", Stream::Directory),
            Err(VfsError::OutOfMemory)
        ));
    }

    #[test]
    fn test_delete_requires_unlinked_and_empty() {
        let mut table = Table::new();
        let dir = table.create("dir", Stream::Directory).unwrap();
        let dir = table.insert(dir);
        let child = table.create("child", Stream::File(())).unwrap();
        let child = table.insert(child);

        table.get_mut(child).unwrap().parent = Some(dir);
        table.get_mut(dir).unwrap().children.push_front(child);

        assert!(matches!(table.delete(dir, false), Err(VfsError::NotAllowed(_))));
        assert!(matches!(table.delete(child, false), Err(VfsError::NotAllowed(_))));

        table.get_mut(dir).unwrap().children.clear();
        table.get_mut(child).unwrap().parent = None;

        table.delete(child, false).unwrap();
        table.delete(dir, false).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_for_each_and_clear() {
        let mut table = Table::new();
        for name in ["a", "b", "c"] {
            let node = table.create(name, Stream::Directory).unwrap();
            table.insert(node);
        }
        let mut seen = Vec::new();
        table.for_each(|_, node| seen.push(node.name().to_string()));
        seen.sort();
        assert_eq!(seen, ["a", "b", "c"]);

        assert_eq!(table.clear(), 3);
        assert!(table.is_empty());
    }
}
