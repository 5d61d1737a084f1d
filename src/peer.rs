//! A peer: one replica of the list, its clocks, and its buffers.
//!
//! The peer is a single-threaded cooperative state machine. Local edits go
//! through the Lamport clock into the ordered list and the outbound buffer;
//! inbound messages land in per-origin queues and drain into the list once
//! the peer matrix says their dependencies are satisfied.
//!
//! # Outbound
//!
//! Every op is preceded in the stream by the clock state reflecting *its*
//! causal dependencies: whenever the pending clock diff is non-empty it is
//! flushed into the buffer before the next op. `make_message` packages the
//! buffer and stamps it with the sent-message count at *send* time.
//!
//! # Inbound
//!
//! Ops queue per origin. A queue drains only while its origin is causally
//! ready, and draining one queue can unlock others, so delivery loops to a
//! fixpoint. Applying an embedded clock update interrupts the drain of that
//! origin: the update may declare new dependencies that the following ops
//! must wait on.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::ProtocolError;
use crate::id::ItemId;
use crate::id::PeerId;
use crate::list::OrderedList;
use crate::matrix::PeerMatrix;
use crate::op::Message;
use crate::op::Op;

/// One replica of the replicated list.
pub struct Peer<V> {
    matrix: PeerMatrix,
    list: OrderedList<V>,
    logical_ts: u64,
    send_buf: Vec<Op<V>>,
    recv_buf: FxHashMap<PeerId, VecDeque<Op<V>>>,
}

impl<V: Clone> Peer<V> {
    /// Create a peer with the given identity.
    ///
    /// Pair with `PeerId::random()` when the caller does not manage peer
    /// identities itself.
    pub fn new(peer_id: PeerId) -> Peer<V> {
        return Peer {
            matrix: PeerMatrix::new(peer_id),
            list: OrderedList::new(),
            logical_ts: 0,
            send_buf: Vec::new(),
            recv_buf: FxHashMap::default(),
        };
    }

    /// This peer's ID.
    #[inline]
    pub fn peer_id(&self) -> PeerId {
        return self.matrix.own_peer_id();
    }

    /// The replicated list, for observation.
    #[inline]
    pub fn list(&self) -> &OrderedList<V> {
        return &self.list;
    }

    /// The peer matrix, for observation.
    #[inline]
    pub fn matrix(&self) -> &PeerMatrix {
        return &self.matrix;
    }

    /// The current Lamport time.
    #[inline]
    pub fn logical_ts(&self) -> u64 {
        return self.logical_ts;
    }

    /// Materialize the visible sequence.
    pub fn to_vec(&self) -> Vec<V> {
        return self.list.to_vec();
    }

    /// Mint a fresh item ID. Local timestamps are strictly increasing.
    fn next_id(&mut self) -> ItemId {
        self.logical_ts += 1;
        return ItemId::new(self.logical_ts, self.peer_id());
    }

    /// Insert `value` at a visible position and buffer the op for broadcast.
    ///
    /// Panics if `pos > list().len()`.
    pub fn insert(&mut self, pos: u64, value: V) {
        let new_id = self.next_id();
        let op = self.list.local_insert(pos, new_id, value);
        self.send_operation(op);
    }

    /// Delete the element at a visible position and buffer the op for
    /// broadcast.
    ///
    /// Panics if `pos >= list().len()`.
    pub fn delete(&mut self, pos: u64) {
        let delete_ts = self.next_id();
        let op = self.list.local_delete(pos, delete_ts);
        self.send_operation(op);
    }

    /// Buffer an op, preceded by the pending clock diff if there is one.
    fn send_operation(&mut self, op: Op<V>) {
        if let Some(update) = self.matrix.take_clock_update() {
            self.send_buf.push(Op::ClockUpdate(update));
        }
        self.send_buf.push(op);
    }

    /// True if there is anything worth transmitting.
    pub fn has_pending_outbound(&self) -> bool {
        return !self.send_buf.is_empty() || self.matrix.has_pending_clock_update();
    }

    /// Package everything buffered since the last flush into a message.
    /// The message count is assigned here, at send time.
    pub fn make_message(&mut self) -> Message<V> {
        if let Some(update) = self.matrix.take_clock_update() {
            self.send_buf.push(Op::ClockUpdate(update));
        }
        let msg_count = self.matrix.increment_sent_messages();
        let operations = std::mem::take(&mut self.send_buf);
        return Message {
            origin_peer_id: self.peer_id(),
            msg_count,
            operations,
        };
    }

    /// Consume a message from the network: queue its ops on the origin's
    /// buffer and drain everything that is causally deliverable.
    pub fn process_message(&mut self, message: Message<V>) -> Result<(), ProtocolError> {
        debug!(
            origin = %message.origin_peer_id,
            msg_count = message.msg_count,
            ops = message.operations.len(),
            "received message"
        );
        let queue = self.recv_buf.entry(message.origin_peer_id).or_default();
        queue.extend(message.operations);
        queue.push_back(Op::MessageProcessed {
            msg_count: message.msg_count,
        });
        return self.drain_ready();
    }

    /// Deliver buffered ops until no origin is causally ready. Draining one
    /// origin can make another ready, hence the outer loop.
    fn drain_ready(&mut self) -> Result<(), ProtocolError> {
        loop {
            let Some(origin) = self.next_ready_origin() else {
                let buffered: usize = self.recv_buf.values().map(|queue| queue.len()).sum();
                if buffered > 0 {
                    debug!(buffered, "ops held back awaiting causal readiness");
                }
                return Ok(());
            };
            self.drain_origin(origin)?;
        }
    }

    /// Pick an origin with buffered ops whose next message is deliverable.
    /// Scanned in sorted ID order so runs are reproducible.
    fn next_ready_origin(&mut self) -> Option<PeerId> {
        let mut candidates: Vec<PeerId> = self
            .recv_buf
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(peer_id, _)| *peer_id)
            .collect();
        candidates.sort();

        for origin in candidates {
            if self.matrix.causally_ready(origin) {
                return Some(origin);
            }
        }
        return None;
    }

    /// Drain one origin's queue in order. Stops early after an embedded
    /// clock update, whose new dependencies force a readiness re-check.
    fn drain_origin(&mut self, origin: PeerId) -> Result<(), ProtocolError> {
        while let Some(op) = self
            .recv_buf
            .get_mut(&origin)
            .and_then(|queue| queue.pop_front())
        {
            match op {
                Op::ClockUpdate(update) => {
                    self.matrix.apply_clock_update(origin, &update)?;
                    return Ok(());
                }
                Op::MessageProcessed { msg_count } => {
                    self.matrix.processed_incoming_msg(origin, msg_count)?;
                }
                Op::Insert { .. } | Op::Delete { .. } => {
                    // Lamport receive rule: never fall behind an op we have
                    // witnessed.
                    if let Some(ts) = op.logical_ts() {
                        self.logical_ts = self.logical_ts.max(ts);
                    }
                    self.list.apply(op)?;
                }
            }
        }
        return Ok(());
    }
}
