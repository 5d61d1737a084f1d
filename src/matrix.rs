//! The peer matrix: vector clocks for every known peer, under compact
//! locally assigned indices.
//!
//! Peer IDs are 32 bytes; spelling them out in every clock entry would be
//! expensive, so each peer assigns small sequential indices to the peers it
//! hears about and clock entries refer to those indices. Indices are local:
//! two peers generally assign different indices to the same third peer, and
//! every clock update carries enough mapping information for the receiver to
//! translate.
//!
//! # Layout
//!
//! Row 0 is the local peer's own vector clock, positioned by locally
//! assigned indices. Row `i` mirrors the vector clock of the peer at local
//! index `i`, positioned by *that* peer's own indices. `M[0][0]` counts
//! messages the local peer has sent; `M[0][i]` counts messages processed
//! from peer `i`.
//!
//! # Diffs, not full clocks
//!
//! A cluster of N peers would otherwise inflate every message by O(N)
//! entries even when little changed. The matrix records exactly which
//! entries moved since the last flush and `take_clock_update` emits only
//! those.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::ProtocolError;
use crate::id::PeerId;
use crate::op::ClockEntry;
use crate::op::ClockUpdate;

/// One cell of the matrix: what some observer knows about a subject.
#[derive(Clone, Debug)]
struct MatrixEntry {
    peer_id: PeerId,
    msg_count: u64,
}

/// Tracks the vector clocks of all known peers and the local diff pending
/// broadcast.
#[derive(Clone, Debug)]
pub struct PeerMatrix {
    /// `rows[observer_index][subject_index]`. Rows are dense because index
    /// assignment is strictly sequential.
    rows: Vec<Vec<MatrixEntry>>,
    /// Local index assigned to each known peer. The local peer is index 0.
    index_by_peer_id: FxHashMap<PeerId, u32>,
    /// Entries changed since the last flush, keyed by subject peer.
    pending: FxHashMap<PeerId, ClockEntry>,
}

impl PeerMatrix {
    /// Create a matrix knowing only the local peer, at index 0.
    pub fn new(own_peer_id: PeerId) -> PeerMatrix {
        let mut index_by_peer_id = FxHashMap::default();
        index_by_peer_id.insert(own_peer_id, 0);
        return PeerMatrix {
            rows: vec![vec![MatrixEntry {
                peer_id: own_peer_id,
                msg_count: 0,
            }]],
            index_by_peer_id,
            pending: FxHashMap::default(),
        };
    }

    /// The local peer's ID.
    #[inline]
    pub fn own_peer_id(&self) -> PeerId {
        return self.rows[0][0].peer_id;
    }

    /// Number of peers known to this matrix, including the local one.
    #[inline]
    pub fn num_peers(&self) -> usize {
        return self.index_by_peer_id.len();
    }

    /// Messages processed from `peer_id` so far (0 if unknown). For the
    /// local peer this is the number of messages *sent*.
    pub fn msg_count(&self, peer_id: PeerId) -> u64 {
        let Some(&index) = self.index_by_peer_id.get(&peer_id) else {
            return 0;
        };
        return self.rows[0][index as usize].msg_count;
    }

    /// Get the local index for a peer, assigning the next sequential one if
    /// the peer is new. Assignments are recorded in the pending clock update
    /// so other peers learn the mapping.
    pub fn peer_id_to_index(&mut self, peer_id: PeerId) -> u32 {
        if let Some(&index) = self.index_by_peer_id.get(&peer_id) {
            return index;
        }

        let index = self.index_by_peer_id.len() as u32;
        self.index_by_peer_id.insert(peer_id, index);
        self.rows[0].push(MatrixEntry {
            peer_id,
            msg_count: 0,
        });
        // The new peer's own slot in its own vector is index 0.
        self.rows.push(vec![MatrixEntry {
            peer_id,
            msg_count: 0,
        }]);
        self.pending.insert(
            peer_id,
            ClockEntry {
                peer_id: Some(peer_id),
                peer_index: index,
                msg_count: 0,
            },
        );
        trace!(peer = %peer_id, index, "assigned local index");
        return index;
    }

    /// Translate an index as used *by* `origin` back to a global peer ID.
    pub fn remote_index_to_peer_id(
        &mut self,
        origin: PeerId,
        remote_index: u32,
    ) -> Result<PeerId, ProtocolError> {
        let origin_index = self.peer_id_to_index(origin) as usize;
        match self.rows[origin_index].get(remote_index as usize) {
            Some(entry) => return Ok(entry.peer_id),
            None => {
                return Err(ProtocolError::UnknownRemoteIndex {
                    origin,
                    index: remote_index,
                })
            }
        }
    }

    /// Record that `origin` has assigned `subject_index` to `subject`.
    ///
    /// An existing mapping must agree with `subject` when given. A new
    /// mapping must extend the row by exactly one slot and must name the
    /// subject.
    pub fn peer_index_mapping(
        &mut self,
        origin: PeerId,
        subject: Option<PeerId>,
        subject_index: u32,
    ) -> Result<(), ProtocolError> {
        let origin_index = self.peer_id_to_index(origin) as usize;
        let row = &mut self.rows[origin_index];

        if let Some(entry) = row.get(subject_index as usize) {
            if let Some(claimed) = subject {
                if claimed != entry.peer_id {
                    return Err(ProtocolError::ContradictoryMapping {
                        origin,
                        index: subject_index,
                        existing: entry.peer_id,
                        claimed,
                    });
                }
            }
            return Ok(());
        }

        if subject_index as usize != row.len() {
            return Err(ProtocolError::NonConsecutiveIndex {
                origin,
                expected: row.len() as u32,
                got: subject_index,
            });
        }
        let Some(subject) = subject else {
            return Err(ProtocolError::NewIndexMissingId {
                origin,
                index: subject_index,
            });
        };
        row.push(MatrixEntry {
            peer_id: subject,
            msg_count: 0,
        });
        return Ok(());
    }

    /// Apply a clock update received from `origin`: install or confirm each
    /// index mapping, then advance the message count.
    pub fn apply_clock_update(
        &mut self,
        origin: PeerId,
        update: &ClockUpdate,
    ) -> Result<(), ProtocolError> {
        for entry in &update.entries {
            self.peer_index_mapping(origin, entry.peer_id, entry.peer_index)?;
            let origin_index = self.peer_id_to_index(origin) as usize;
            let existing = &mut self.rows[origin_index][entry.peer_index as usize];
            if existing.msg_count > entry.msg_count {
                return Err(ProtocolError::ClockWentBackwards {
                    origin,
                    subject: existing.peer_id,
                    from: existing.msg_count,
                    to: entry.msg_count,
                });
            }
            existing.msg_count = entry.msg_count;
        }
        return Ok(());
    }

    /// Bump the local sent-message counter. Called exactly once per outbound
    /// message; the result is that message's `msg_count`.
    pub fn increment_sent_messages(&mut self) -> u64 {
        self.rows[0][0].msg_count += 1;
        return self.rows[0][0].msg_count;
    }

    /// Record that one inbound message from `origin` has been fully applied.
    /// Counts must advance by exactly 1: a replayed message regresses, a gap
    /// jumps, and the FIFO transport assumption rules out both.
    pub fn processed_incoming_msg(
        &mut self,
        origin: PeerId,
        msg_count: u64,
    ) -> Result<(), ProtocolError> {
        let origin_index = self.peer_id_to_index(origin) as usize;
        let expected = self.rows[0][origin_index].msg_count + 1;
        if msg_count < expected {
            return Err(ProtocolError::MsgCountBackwards {
                origin,
                expected,
                got: msg_count,
            });
        }
        if msg_count > expected {
            return Err(ProtocolError::MsgCountJumped {
                origin,
                expected,
                got: msg_count,
            });
        }

        self.rows[0][origin_index].msg_count = msg_count;
        self.rows[origin_index][0].msg_count = msg_count;

        let entry = self.pending.entry(origin).or_insert(ClockEntry {
            peer_id: Some(origin),
            peer_index: origin_index as u32,
            msg_count,
        });
        entry.msg_count = msg_count;
        return Ok(());
    }

    /// Check whether the next message from `remote` can be applied: for
    /// every peer in the remote's mirrored clock except `remote` itself, we
    /// must have processed at least as many messages. Peers absent from our
    /// clock count as 0.
    pub fn causally_ready(&mut self, remote: PeerId) -> bool {
        let remote_index = self.peer_id_to_index(remote) as usize;
        let local: FxHashMap<PeerId, u64> = self.rows[0]
            .iter()
            .map(|entry| (entry.peer_id, entry.msg_count))
            .collect();

        for entry in &self.rows[remote_index] {
            if entry.peer_id == remote {
                continue;
            }
            if local.get(&entry.peer_id).copied().unwrap_or(0) < entry.msg_count {
                return false;
            }
        }
        return true;
    }

    /// True if local clock knowledge has changed since the last flush.
    #[inline]
    pub fn has_pending_clock_update(&self) -> bool {
        return !self.pending.is_empty();
    }

    /// Snapshot the pending diff as a frozen update, clearing it. Entries
    /// are ordered by local index. Returns `None` when nothing changed.
    pub fn take_clock_update(&mut self) -> Option<ClockUpdate> {
        if self.pending.is_empty() {
            return None;
        }
        let mut entries: Vec<ClockEntry> = self.pending.drain().map(|(_, entry)| entry).collect();
        entries.sort_by_key(|entry| entry.peer_index);
        return Some(ClockUpdate { entries });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(byte: u8) -> PeerId {
        return PeerId([byte; 32]);
    }

    #[test]
    fn own_peer_is_index_zero() {
        let matrix = PeerMatrix::new(peer(1));
        assert_eq!(matrix.own_peer_id(), peer(1));
        assert_eq!(matrix.num_peers(), 1);
        assert!(!matrix.has_pending_clock_update());
    }

    #[test]
    fn indices_are_sequential() {
        let mut matrix = PeerMatrix::new(peer(1));
        assert_eq!(matrix.peer_id_to_index(peer(1)), 0);
        assert_eq!(matrix.peer_id_to_index(peer(2)), 1);
        assert_eq!(matrix.peer_id_to_index(peer(3)), 2);
        assert_eq!(matrix.peer_id_to_index(peer(2)), 1);
        assert_eq!(matrix.num_peers(), 3);
    }

    #[test]
    fn new_index_lands_in_the_pending_update() {
        let mut matrix = PeerMatrix::new(peer(1));
        matrix.peer_id_to_index(peer(2));

        let update = matrix.take_clock_update().unwrap();
        assert_eq!(update.entries.len(), 1);
        assert_eq!(update.entries[0].peer_id, Some(peer(2)));
        assert_eq!(update.entries[0].peer_index, 1);
        assert_eq!(update.entries[0].msg_count, 0);
        assert!(matrix.take_clock_update().is_none());
    }

    #[test]
    fn remote_index_translation() {
        let mut matrix = PeerMatrix::new(peer(1));
        matrix
            .peer_index_mapping(peer(2), Some(peer(3)), 1)
            .unwrap();

        assert_eq!(matrix.remote_index_to_peer_id(peer(2), 0).unwrap(), peer(2));
        assert_eq!(matrix.remote_index_to_peer_id(peer(2), 1).unwrap(), peer(3));
        assert!(matches!(
            matrix.remote_index_to_peer_id(peer(2), 2),
            Err(ProtocolError::UnknownRemoteIndex { index: 2, .. })
        ));
    }

    #[test]
    fn contradictory_mapping_is_rejected() {
        let mut matrix = PeerMatrix::new(peer(1));
        matrix
            .peer_index_mapping(peer(2), Some(peer(3)), 1)
            .unwrap();

        // Confirming with the same ID, or no ID at all, is fine.
        matrix
            .peer_index_mapping(peer(2), Some(peer(3)), 1)
            .unwrap();
        matrix.peer_index_mapping(peer(2), None, 1).unwrap();

        let result = matrix.peer_index_mapping(peer(2), Some(peer(4)), 1);
        assert!(matches!(
            result,
            Err(ProtocolError::ContradictoryMapping { index: 1, .. })
        ));
    }

    #[test]
    fn nonconsecutive_index_is_rejected() {
        let mut matrix = PeerMatrix::new(peer(1));
        let result = matrix.peer_index_mapping(peer(2), Some(peer(3)), 5);
        assert!(matches!(
            result,
            Err(ProtocolError::NonConsecutiveIndex {
                expected: 1,
                got: 5,
                ..
            })
        ));
    }

    #[test]
    fn new_index_requires_an_id() {
        let mut matrix = PeerMatrix::new(peer(1));
        let result = matrix.peer_index_mapping(peer(2), None, 1);
        assert!(matches!(
            result,
            Err(ProtocolError::NewIndexMissingId { index: 1, .. })
        ));
    }

    #[test]
    fn clock_update_advances_counts() {
        let mut matrix = PeerMatrix::new(peer(1));
        let update = ClockUpdate {
            entries: vec![ClockEntry {
                peer_id: Some(peer(3)),
                peer_index: 1,
                msg_count: 4,
            }],
        };
        matrix.apply_clock_update(peer(2), &update).unwrap();

        let backwards = ClockUpdate {
            entries: vec![ClockEntry {
                peer_id: Some(peer(3)),
                peer_index: 1,
                msg_count: 3,
            }],
        };
        assert!(matches!(
            matrix.apply_clock_update(peer(2), &backwards),
            Err(ProtocolError::ClockWentBackwards { from: 4, to: 3, .. })
        ));
    }

    #[test]
    fn sent_message_count_increments() {
        let mut matrix = PeerMatrix::new(peer(1));
        assert_eq!(matrix.increment_sent_messages(), 1);
        assert_eq!(matrix.increment_sent_messages(), 2);
        assert_eq!(matrix.msg_count(peer(1)), 2);
    }

    #[test]
    fn processed_msg_requires_exact_increment() {
        let mut matrix = PeerMatrix::new(peer(1));
        matrix.processed_incoming_msg(peer(2), 1).unwrap();
        matrix.processed_incoming_msg(peer(2), 2).unwrap();

        assert!(matches!(
            matrix.processed_incoming_msg(peer(2), 2),
            Err(ProtocolError::MsgCountBackwards {
                expected: 3,
                got: 2,
                ..
            })
        ));
        assert!(matches!(
            matrix.processed_incoming_msg(peer(2), 4),
            Err(ProtocolError::MsgCountJumped {
                expected: 3,
                got: 4,
                ..
            })
        ));
        assert_eq!(matrix.msg_count(peer(2)), 2);
    }

    #[test]
    fn processed_msg_lands_in_the_pending_update() {
        let mut matrix = PeerMatrix::new(peer(1));
        matrix.processed_incoming_msg(peer(2), 1).unwrap();

        let update = matrix.take_clock_update().unwrap();
        assert_eq!(update.entries.len(), 1);
        assert_eq!(update.entries[0].peer_id, Some(peer(2)));
        assert_eq!(update.entries[0].msg_count, 1);
    }

    #[test]
    fn unknown_peer_is_trivially_ready() {
        let mut matrix = PeerMatrix::new(peer(1));
        assert!(matrix.causally_ready(peer(2)));
    }

    #[test]
    fn readiness_waits_for_declared_dependencies() {
        let mut matrix = PeerMatrix::new(peer(1));
        // Peer 2 declares it has seen 1 message from peer 3.
        let update = ClockUpdate {
            entries: vec![ClockEntry {
                peer_id: Some(peer(3)),
                peer_index: 1,
                msg_count: 1,
            }],
        };
        matrix.apply_clock_update(peer(2), &update).unwrap();
        assert!(!matrix.causally_ready(peer(2)));

        // Once we process that message from peer 3 ourselves, peer 2 is
        // ready again.
        matrix.processed_incoming_msg(peer(3), 1).unwrap();
        assert!(matrix.causally_ready(peer(2)));
    }

    #[test]
    fn readiness_ignores_the_remote_itself() {
        let mut matrix = PeerMatrix::new(peer(1));
        // Peer 2's own count is ahead of what we've processed; that is
        // exactly the message we are about to apply.
        matrix.processed_incoming_msg(peer(2), 1).unwrap();
        let update = ClockUpdate {
            entries: vec![ClockEntry {
                peer_id: Some(peer(2)),
                peer_index: 0,
                msg_count: 5,
            }],
        };
        matrix.apply_clock_update(peer(2), &update).unwrap();
        assert!(matrix.causally_ready(peer(2)));
    }

    #[test]
    fn update_entries_are_ordered_by_index() {
        let mut matrix = PeerMatrix::new(peer(1));
        matrix.peer_id_to_index(peer(4));
        matrix.peer_id_to_index(peer(2));
        matrix.peer_id_to_index(peer(9));

        let update = matrix.take_clock_update().unwrap();
        let indices: Vec<u32> = update.entries.iter().map(|e| e.peer_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }
}
