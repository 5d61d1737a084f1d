//! The replicated ordered list.
//!
//! This is an RGA (Replicated Growable Array): a sequence CRDT where every
//! element carries an immutable `ItemId` and insertions are anchored to the
//! ID of an existing element. Key design decisions:
//!
//! 1. **Arena storage**: Nodes live in a `Vec` and link to each other with
//!    `u32` indices. Nothing is ever removed, so indices stay valid and the
//!    usual linked-list ownership headaches disappear.
//!
//! 2. **Tombstones**: Deleting an element only flips a flag. The node stays
//!    in the structure forever because concurrent (and future) inserts may
//!    anchor on it.
//!
//! 3. **Deterministic sibling order**: Concurrent inserts at the same anchor
//!    are placed in descending `ItemId` order. Since `ItemId` is totally
//!    ordered, every replica resolves an insertion race identically.
//!
//! Visible positions (what the application sees) skip tombstones. Position
//! lookups walk the list, which is O(n).
// TODO: Maintain an order-statistic tree over visible counts for O(log n)
// position lookups.

use rustc_hash::FxHashMap;

use crate::error::ProtocolError;
use crate::id::ItemId;
use crate::op::Op;

/// A single element, live or tombstoned.
#[derive(Clone, Debug)]
struct Node<V> {
    id: ItemId,
    value: V,
    deleted: bool,
    prev: Option<u32>,
    next: Option<u32>,
}

/// A replicated growable array over values of type `V`.
#[derive(Clone, Debug)]
pub struct OrderedList<V> {
    /// All nodes ever created, in creation order.
    nodes: Vec<Node<V>>,
    /// Arena index of each node, keyed by item ID.
    index_of: FxHashMap<ItemId, u32>,
    /// Arena index of the first node in linearization order.
    head: Option<u32>,
    /// Number of non-deleted nodes.
    visible_len: u64,
}

impl<V> OrderedList<V> {
    /// Create a new empty list.
    pub fn new() -> OrderedList<V> {
        return OrderedList {
            nodes: Vec::new(),
            index_of: FxHashMap::default(),
            head: None,
            visible_len: 0,
        };
    }

    /// Get the visible length (excluding tombstones).
    #[inline]
    pub fn len(&self) -> u64 {
        return self.visible_len;
    }

    /// Check if the list has no visible elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        return self.visible_len == 0;
    }

    /// Get the value at a visible position, if it exists.
    pub fn get(&self, pos: u64) -> Option<&V> {
        if pos >= self.visible_len {
            return None;
        }
        let node = &self.nodes[self.visible_node_at(pos) as usize];
        return Some(&node.value);
    }

    /// Iterate over the visible values in list order.
    pub fn iter(&self) -> Iter<'_, V> {
        return Iter {
            list: self,
            cursor: self.head,
        };
    }

    /// Materialize the visible sequence.
    pub fn to_vec(&self) -> Vec<V>
    where
        V: Clone,
    {
        return self.iter().cloned().collect();
    }

    /// Insert locally at a visible position, producing the op to broadcast.
    /// `new_id` must be freshly minted by the local peer.
    ///
    /// Panics if `pos > len()`.
    pub(crate) fn local_insert(&mut self, pos: u64, new_id: ItemId, value: V) -> Op<V>
    where
        V: Clone,
    {
        if pos > self.visible_len {
            panic!("position {} out of bounds", pos);
        }
        let reference_id = if pos == 0 {
            None
        } else {
            Some(self.nodes[self.visible_node_at(pos - 1) as usize].id)
        };
        self.integrate(reference_id, new_id, value.clone())
            .expect("locally minted IDs are fresh");
        return Op::Insert {
            reference_id,
            new_id,
            value,
        };
    }

    /// Tombstone the element at a visible position, producing the op to
    /// broadcast. `delete_ts` must be freshly minted by the local peer.
    ///
    /// Panics if `pos >= len()`.
    pub(crate) fn local_delete(&mut self, pos: u64, delete_ts: ItemId) -> Op<V> {
        if pos >= self.visible_len {
            panic!("position {} out of bounds", pos);
        }
        let target = self.visible_node_at(pos) as usize;
        let delete_id = self.nodes[target].id;
        self.nodes[target].deleted = true;
        self.visible_len -= 1;
        return Op::Delete {
            delete_id,
            delete_ts,
        };
    }

    /// Apply a remote insert or delete.
    ///
    /// Panics if handed a control operation; those belong to the peer's
    /// delivery loop, not the list.
    pub fn apply(&mut self, op: Op<V>) -> Result<(), ProtocolError> {
        match op {
            Op::Insert {
                reference_id,
                new_id,
                value,
            } => {
                return self.integrate(reference_id, new_id, value);
            }
            Op::Delete {
                delete_id,
                delete_ts,
            } => {
                return self.apply_delete(delete_id, delete_ts);
            }
            Op::ClockUpdate(_) | Op::MessageProcessed { .. } => {
                panic!("control operations cannot be applied to the list");
            }
        }
    }

    /// Splice a new node in after `reference_id` (or at the head), skipping
    /// over concurrent siblings with larger IDs.
    fn integrate(
        &mut self,
        reference_id: Option<ItemId>,
        new_id: ItemId,
        value: V,
    ) -> Result<(), ProtocolError> {
        if self.index_of.contains_key(&new_id) {
            return Err(ProtocolError::DuplicateItemId {
                origin: new_id.peer_id,
                id: new_id,
            });
        }

        let mut prev;
        let mut cursor;
        match reference_id {
            Some(ref_id) => {
                let Some(&anchor) = self.index_of.get(&ref_id) else {
                    return Err(ProtocolError::UnknownReference {
                        origin: new_id.peer_id,
                        id: ref_id,
                    });
                };
                prev = Some(anchor);
                cursor = self.nodes[anchor as usize].next;
            }
            None => {
                prev = None;
                cursor = self.head;
            }
        }

        // Concurrent inserts at the same anchor land in descending ID order:
        // skip forward past every node with a larger ID, stop at the first
        // with a smaller one.
        while let Some(i) = cursor {
            let node = &self.nodes[i as usize];
            if node.id < new_id {
                break;
            }
            prev = Some(i);
            cursor = node.next;
        }

        let idx = self.nodes.len() as u32;
        self.nodes.push(Node {
            id: new_id,
            value,
            deleted: false,
            prev,
            next: cursor,
        });
        match prev {
            Some(p) => self.nodes[p as usize].next = Some(idx),
            None => self.head = Some(idx),
        }
        if let Some(n) = cursor {
            self.nodes[n as usize].prev = Some(idx);
        }
        self.index_of.insert(new_id, idx);
        self.visible_len += 1;
        return Ok(());
    }

    /// Tombstone by ID. Re-applying a delete is a no-op.
    fn apply_delete(&mut self, delete_id: ItemId, delete_ts: ItemId) -> Result<(), ProtocolError> {
        let Some(&target) = self.index_of.get(&delete_id) else {
            return Err(ProtocolError::UnknownReference {
                origin: delete_ts.peer_id,
                id: delete_id,
            });
        };
        let node = &mut self.nodes[target as usize];
        if !node.deleted {
            node.deleted = true;
            self.visible_len -= 1;
        }
        return Ok(());
    }

    /// Find the arena index of the node at a visible position.
    fn visible_node_at(&self, pos: u64) -> u32 {
        let mut seen = 0;
        let mut cursor = self.head;
        while let Some(i) = cursor {
            let node = &self.nodes[i as usize];
            if !node.deleted {
                if seen == pos {
                    return i;
                }
                seen += 1;
            }
            cursor = node.next;
        }
        panic!("position {} out of bounds", pos);
    }
}

impl<V> Default for OrderedList<V> {
    fn default() -> Self {
        return Self::new();
    }
}

/// Iterator over visible values in list order.
pub struct Iter<'a, V> {
    list: &'a OrderedList<V>,
    cursor: Option<u32>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        while let Some(i) = self.cursor {
            let node = &self.list.nodes[i as usize];
            self.cursor = node.next;
            if !node.deleted {
                return Some(&node.value);
            }
        }
        return None;
    }
}
