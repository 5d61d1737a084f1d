//! Identifier types for peers and list items.
//!
//! # Identifier Hierarchy
//!
//! - `PeerId`: identifies a replica (256 random bits)
//! - `ItemId`: identifies an element ever inserted into the list
//!   (Lamport timestamp, peer)
//!
//! # Design Decisions
//!
//! IDs are designed to be:
//! - Globally unique: peer IDs are random, and each peer's timestamps are
//!   strictly increasing
//! - Totally ordered: `ItemId` compares by timestamp first, peer second,
//!   so concurrent inserts resolve the same way on every replica
//! - Consistent with causality: an op issued after another was visible
//!   carries a strictly larger `ItemId`
//! - Hashable: usable as map keys

use std::cmp::Ordering;

use rand_core::OsRng;
use rand_core::RngCore;
use serde::Deserialize;
use serde::Serialize;

/// A peer identifier: 256 random bits.
///
/// The byte-lexicographic order (equivalently, the order of the lowercase
/// hex rendering) is used only to break ties between concurrent inserts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Generate a random peer ID from the operating system's RNG.
    pub fn random() -> PeerId {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        return PeerId(bytes);
    }

    /// Render as lowercase hex.
    pub fn to_hex(&self) -> String {
        return hex(&self.0);
    }
}

fn hex(bytes: &[u8]) -> String {
    return bytes.iter().map(|b| format!("{:02x}", b)).collect();
}

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "PeerId({})", hex(&self.0));
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}", hex(&self.0));
    }
}

/// An item identifier.
///
/// Uniquely identifies an element of the replicated list. The pair is
/// globally unique because each peer's `logical_ts` is strictly increasing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    /// The Lamport timestamp at which the item was created.
    pub logical_ts: u64,
    /// The peer that created the item.
    pub peer_id: PeerId,
}

impl ItemId {
    /// Create a new item ID.
    pub fn new(logical_ts: u64, peer_id: PeerId) -> ItemId {
        return ItemId { logical_ts, peer_id };
    }
}

impl std::fmt::Debug for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "ItemId({}, {})", self.logical_ts, self.peer_id.to_hex());
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare by timestamp first, then by peer as a tie-breaker
        match self.logical_ts.cmp(&other.logical_ts) {
            Ordering::Equal => self.peer_id.cmp(&other.peer_id),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(byte: u8) -> PeerId {
        return PeerId([byte; 32]);
    }

    #[test]
    fn random_peer_ids_differ() {
        let a = PeerId::random();
        let b = PeerId::random();
        assert_ne!(a, b);
    }

    #[test]
    fn hex_is_lowercase() {
        let id = PeerId([0xab; 32]);
        assert_eq!(id.to_hex(), "ab".repeat(32));
        assert_eq!(format!("{}", id), "ab".repeat(32));
    }

    #[test]
    fn item_id_orders_by_timestamp_first() {
        let a = ItemId::new(1, peer(9));
        let b = ItemId::new(2, peer(1));

        assert!(a < b);
    }

    #[test]
    fn item_id_breaks_ties_by_peer() {
        let a = ItemId::new(3, peer(1));
        let b = ItemId::new(3, peer(2));

        assert!(a < b);
        assert!(b > a);
    }

    #[test]
    fn item_id_equality() {
        let a = ItemId::new(3, peer(1));
        let b = ItemId::new(3, peer(1));

        assert_eq!(a, b);
    }
}
