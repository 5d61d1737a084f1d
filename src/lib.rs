//! Concord - a replicated ordered-list CRDT with causal message delivery.
//!
//! Multiple peers concurrently edit a sequence of values and converge to
//! the same result without central coordination. Three pieces compose:
//!
//! - [`OrderedList`]: an RGA (Replicated Growable Array) where every
//!   element carries a unique [`ItemId`], concurrent inserts at the same
//!   anchor resolve by a deterministic total order, and deletions leave
//!   tombstones.
//! - [`PeerMatrix`]: every known peer's vector clock under compact locally
//!   assigned indices, emitting incremental diffs instead of full clocks.
//! - [`Peer`]: ties them together with per-origin receive buffers that hold
//!   operations until their causal dependencies are satisfied.
//!
//! The crate is pure state and pure functions of messages: serialization,
//! transport, and persistence belong to the caller. Messages from any one
//! peer must be delivered to any other in order and without loss
//! (per-channel FIFO); delivery order *across* senders is unconstrained.
//!
//! # Quick Start
//!
//! ```
//! use concord::Peer;
//! use concord::PeerId;
//!
//! // Two replicas of one document
//! let mut alice: Peer<char> = Peer::new(PeerId::random());
//! let mut bob: Peer<char> = Peer::new(PeerId::random());
//!
//! // Alice edits locally
//! alice.insert(0, 'h');
//! alice.insert(1, 'i');
//!
//! // ... and ships her changes to Bob
//! assert!(alice.has_pending_outbound());
//! let message = alice.make_message();
//! bob.process_message(message).unwrap();
//!
//! assert_eq!(bob.to_vec(), vec!['h', 'i']);
//! ```

pub mod error;
pub mod id;
pub mod list;
pub mod matrix;
pub mod op;
pub mod peer;

// Re-exports for convenience
pub use error::ProtocolError;
pub use id::ItemId;
pub use id::PeerId;
pub use list::OrderedList;
pub use matrix::PeerMatrix;
pub use op::ClockEntry;
pub use op::ClockUpdate;
pub use op::Message;
pub use op::Op;
pub use peer::Peer;
