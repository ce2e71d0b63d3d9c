//! Non-blocking message transport seam and an in-memory implementation.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use lwm2m_core::CoapMessage;

/// Outcome of handing a message to a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The message left; report the send confirmation.
    Sent,
    /// Not sent yet; offer the same message again on the next poll.
    InProgress,
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport closed")]
    Closed,
}

/// Datagram transport carrying decoded CoAP messages.
///
/// Both calls must return immediately; the driver polls.
pub trait Transport {
    fn send(&mut self, msg: &CoapMessage) -> Result<SendStatus, TransportError>;

    /// Next inbound message, if one is waiting.
    fn receive(&mut self) -> Result<Option<CoapMessage>, TransportError>;
}

type Queue = Rc<RefCell<VecDeque<CoapMessage>>>;

/// One end of an in-memory datagram link.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    outbound: Queue,
    inbound: Queue,
    closed: Rc<Cell<bool>>,
    /// Sends left to answer with [`SendStatus::InProgress`].
    stalled_sends: usize,
}

impl MemoryTransport {
    /// Two connected ends: what one sends the other receives.
    pub fn pair() -> (Self, Self) {
        let a_to_b: Queue = Rc::default();
        let b_to_a: Queue = Rc::default();
        let closed = Rc::new(Cell::new(false));
        let a = Self {
            outbound: a_to_b.clone(),
            inbound: b_to_a.clone(),
            closed: closed.clone(),
            stalled_sends: 0,
        };
        let b = Self {
            outbound: b_to_a,
            inbound: a_to_b,
            closed,
            stalled_sends: 0,
        };
        (a, b)
    }

    /// Answer the next `count` sends with [`SendStatus::InProgress`].
    pub fn stall_sends(&mut self, count: usize) {
        self.stalled_sends = count;
    }

    /// Close the link for both ends.
    pub fn close(&self) {
        self.closed.set(true);
    }

    /// Messages sent by this end that the peer has not received yet.
    pub fn in_flight(&self) -> usize {
        self.outbound.borrow().len()
    }

    /// Queue a message as if the peer had sent it.
    pub fn inject(&self, msg: CoapMessage) {
        self.inbound.borrow_mut().push_back(msg);
    }

    /// Take everything this end sent that the peer has not received yet.
    pub fn drain_sent(&self) -> Vec<CoapMessage> {
        self.outbound.borrow_mut().drain(..).collect()
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, msg: &CoapMessage) -> Result<SendStatus, TransportError> {
        if self.closed.get() {
            return Err(TransportError::Closed);
        }
        if self.stalled_sends > 0 {
            self.stalled_sends -= 1;
            return Ok(SendStatus::InProgress);
        }
        self.outbound.borrow_mut().push_back(msg.clone());
        Ok(SendStatus::Sent)
    }

    fn receive(&mut self) -> Result<Option<CoapMessage>, TransportError> {
        if self.closed.get() {
            return Err(TransportError::Closed);
        }
        Ok(self.inbound.borrow_mut().pop_front())
    }
}
