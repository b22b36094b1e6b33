//! Outbound message queue and the transport seam.
//!
//! Handlers run inside synchronous game-event callbacks, so they only ever
//! [`enqueue`](OutboundQueue::enqueue). [`flush`](OutboundQueue::flush)
//! encodes the buffered messages in enqueue order and hands them to the
//! external [`Transport`], coalescing everything produced in one tick into a
//! single write burst. Delivery is fire-and-forget.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::message::{encode_frame, Message};

/// External transport offering reliable, ordered delivery of opaque frames
/// to the single peer.
pub trait Transport {
    /// Hand a frame to the transport. Must not block.
    fn transmit(&mut self, frame: Vec<u8>);
}

/// Per-session ordered buffer of outgoing messages.
pub struct OutboundQueue {
    version: u32,
    pending: Vec<Message>,
    transport: Box<dyn Transport>,
    frames_sent: u64,
}

impl fmt::Debug for OutboundQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundQueue")
            .field("version", &self.version)
            .field("pending", &self.pending)
            .field("frames_sent", &self.frames_sent)
            .finish_non_exhaustive()
    }
}

impl OutboundQueue {
    /// Create a queue writing frames stamped with `version` to `transport`.
    #[must_use]
    pub fn new(version: u32, transport: Box<dyn Transport>) -> Self {
        Self {
            version,
            pending: Vec::new(),
            transport,
            frames_sent: 0,
        }
    }

    /// Append a message. Never blocks.
    pub fn enqueue(&mut self, message: impl Into<Message>) {
        self.pending.push(message.into());
    }

    /// Encode and transmit all buffered messages in enqueue order.
    ///
    /// Returns the number of frames handed to the transport. A message that
    /// fails to encode is logged and skipped; the rest still go out.
    pub fn flush(&mut self) -> usize {
        let mut sent = 0;
        for message in self.pending.drain(..) {
            match encode_frame(self.version, &message) {
                Ok(frame) => {
                    self.transport.transmit(frame);
                    sent += 1;
                }
                Err(e) => {
                    tracing::warn!("flush: dropping {}: {}", message.kind(), e);
                }
            }
        }
        self.frames_sent += sent as u64;
        sent
    }

    /// Messages waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> &[Message] {
        &self.pending
    }

    /// Number of messages waiting for the next flush.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total frames handed to the transport so far.
    #[must_use]
    pub const fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}

// ============================================================================
// In-process loopback
// ============================================================================

type Wire = Rc<RefCell<VecDeque<Vec<u8>>>>;

/// Sending half of an in-process, single-threaded frame pipe.
///
/// Used by tests and the headless runner to connect two sessions living in
/// the same process.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    wire: Wire,
}

/// Receiving half of a [`LoopbackTransport`].
#[derive(Debug, Clone, Default)]
pub struct LoopbackEndpoint {
    wire: Wire,
}

impl LoopbackTransport {
    /// Create a connected sender/receiver pair.
    #[must_use]
    pub fn channel() -> (Self, LoopbackEndpoint) {
        let wire = Wire::default();
        (
            Self {
                wire: Rc::clone(&wire),
            },
            LoopbackEndpoint { wire },
        )
    }
}

impl Transport for LoopbackTransport {
    fn transmit(&mut self, frame: Vec<u8>) {
        self.wire.borrow_mut().push_back(frame);
    }
}

impl LoopbackEndpoint {
    /// Take the oldest frame in flight.
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.wire.borrow_mut().pop_front()
    }

    /// Copy of the oldest frame in flight, left in place.
    #[must_use]
    pub fn peek(&self) -> Option<Vec<u8>> {
        self.wire.borrow().front().cloned()
    }

    /// Take every frame in flight, oldest first.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.wire.borrow_mut().drain(..).collect()
    }

    /// Number of frames in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.wire.borrow().len()
    }
}
