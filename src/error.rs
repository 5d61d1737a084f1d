//! Protocol violation errors.
//!
//! Two failure classes exist. Programmer errors (out-of-range positions,
//! feeding a control op to the list) are bugs in the calling code and panic.
//! Protocol violations mean a remote peer sent something a correct peer
//! never would; they surface as `ProtocolError` with the offending peer and
//! the expected-vs-actual values, so the caller can quarantine that peer.
//!
//! No partial-apply recovery is attempted. Operations apply transactionally
//! one at a time, and a failure mid-message leaves the state reached by the
//! last successfully applied op.

use thiserror::Error;

use crate::id::ItemId;
use crate::id::PeerId;

/// A protocol violation by a remote peer.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A clock update claimed an index mapping that contradicts one we
    /// already recorded for the same origin.
    #[error("peer {origin} maps index {index} to {existing}, not {claimed}")]
    ContradictoryMapping {
        origin: PeerId,
        index: u32,
        existing: PeerId,
        claimed: PeerId,
    },

    /// A new index mapping skipped ahead; indices must be assigned
    /// sequentially from 0.
    #[error("peer {origin} assigned index {got} where {expected} was expected")]
    NonConsecutiveIndex {
        origin: PeerId,
        expected: u32,
        got: u32,
    },

    /// A previously unseen index arrived without the peer ID it maps to.
    #[error("peer {origin} introduced index {index} without a peer ID")]
    NewIndexMissingId { origin: PeerId, index: u32 },

    /// An operation referenced an index with no known mapping.
    #[error("peer {origin} used index {index}, which has no known mapping")]
    UnknownRemoteIndex { origin: PeerId, index: u32 },

    /// A clock update tried to lower a message count.
    #[error("clock entry for {subject} from {origin} went backwards ({from} -> {to})")]
    ClockWentBackwards {
        origin: PeerId,
        subject: PeerId,
        from: u64,
        to: u64,
    },

    /// A message count regressed; the message was already processed.
    #[error("message count from {origin} went backwards (expected {expected}, got {got})")]
    MsgCountBackwards {
        origin: PeerId,
        expected: u64,
        got: u64,
    },

    /// A message count skipped ahead; the FIFO channel dropped something.
    #[error("message count from {origin} jumped forwards (expected {expected}, got {got})")]
    MsgCountJumped {
        origin: PeerId,
        expected: u64,
        got: u64,
    },

    /// An operation referenced an item not yet known here. Under causal
    /// delivery this cannot happen with a correct peer.
    #[error("operation from {origin} references unknown item {id:?}")]
    UnknownReference { origin: PeerId, id: ItemId },

    /// An insert re-used an item ID that already exists.
    #[error("peer {origin} re-used item ID {id:?}")]
    DuplicateItemId { origin: PeerId, id: ItemId },
}
