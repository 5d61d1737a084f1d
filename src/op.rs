//! Operations exchanged between peers.
//!
//! Each peer produces a stream of operations that, when replayed in causal
//! order, reconstructs the list state. Operations are *intention-preserving*:
//!
//! - Insert: "I inserted this value after ItemId X"
//! - Delete: "I tombstoned the item with ItemId X"
//!
//! The ItemId identifies a position in a way that survives concurrent edits.
//! Unlike positional indices (which shift), ItemIds are stable.
//!
//! Two control variants travel in the same stream: `ClockUpdate` carries the
//! sender's vector-clock diff ahead of the ops that depend on it, and
//! `MessageProcessed` is a marker the *receiver* appends at each message
//! boundary so clock-counter bumps happen at the right point in the queue.

use serde::Deserialize;
use serde::Serialize;

use crate::id::ItemId;
use crate::id::PeerId;

/// One entry of a clock update: the index the sender assigned to a subject
/// peer, and how many of the subject's messages the sender has processed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockEntry {
    /// The subject's global ID. May be omitted when the recipient already
    /// knows the mapping for this index.
    pub peer_id: Option<PeerId>,
    /// The index the sender assigned to the subject.
    pub peer_index: u32,
    /// Messages the sender has processed from the subject.
    pub msg_count: u64,
}

/// A frozen vector-clock diff, as carried in the operation stream.
/// Entries are ordered by the sender's `peer_index`, ascending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockUpdate {
    pub entries: Vec<ClockEntry>,
}

/// An operation in a peer's message stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op<V> {
    /// Insert `value` immediately after the item `reference_id`.
    /// A reference of `None` means insert at the head of the list.
    Insert {
        reference_id: Option<ItemId>,
        new_id: ItemId,
        value: V,
    },

    /// Tombstone the item `delete_id`. `delete_ts` is a fresh ItemId minted
    /// at the origin: the delete advances the Lamport clock and has its own
    /// identity for causal bookkeeping.
    Delete {
        delete_id: ItemId,
        delete_ts: ItemId,
    },

    /// A vector-clock diff embedded in the stream, positioned so that every
    /// following op sees the clock state its dependencies require.
    ClockUpdate(ClockUpdate),

    /// Marker appended by the receiver between messages. Never sent.
    MessageProcessed { msg_count: u64 },
}

impl<V> Op<V> {
    /// The Lamport timestamp attached to this operation, if any.
    /// Control operations carry none.
    pub fn logical_ts(&self) -> Option<u64> {
        match self {
            Op::Insert { new_id, .. } => return Some(new_id.logical_ts),
            Op::Delete { delete_ts, .. } => return Some(delete_ts.logical_ts),
            Op::ClockUpdate(_) | Op::MessageProcessed { .. } => return None,
        }
    }
}

/// Everything one peer broadcast since its last flush.
///
/// `msg_count` is the monotonically increasing count of messages ever sent
/// by `origin_peer_id`; receivers use it to detect gaps and replays.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message<V> {
    pub origin_peer_id: PeerId,
    pub msg_count: u64,
    pub operations: Vec<Op<V>>,
}
