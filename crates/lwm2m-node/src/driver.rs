//! Poll loop connecting one [`Exchange`] to a [`Transport`].
//!
//! The driver owns the caller side of the exchange contract: every message
//! the exchange fills in goes to the transport, a successful send is reported
//! back as the send confirmation, inbound messages are screened against the
//! response cache before the exchange sees them, and idle polls advance the
//! exchange's timers.

use lwm2m_core::{Clock, CoapMessage, Code, Operation, RandomSource, SystemClock};
use lwm2m_exchange::{
    CacheLookup, Exchange, ExchangeEvent, ExchangeHandlers, ExchangeState, TerminateReason,
};
use rand::rngs::ThreadRng;

use crate::error::NodeError;
use crate::transport::{SendStatus, Transport, TransportError};

/// What a call to [`Driver::poll`] left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// No exchange is running.
    Idle,
    /// An exchange is running; poll again after the next tick.
    Pending,
    /// The running exchange finished during this poll.
    Finished,
    /// A peer request arrived while idle; start a server exchange for it.
    Unhandled(CoapMessage),
}

/// Counters kept by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub sent: u64,
    pub received: u64,
    /// Duplicates answered with the cached response.
    pub resent_from_cache: u64,
    /// Duplicates of older requests, dropped.
    pub dropped_duplicates: u64,
}

pub struct Driver<T: Transport, C: Clock = SystemClock, R: RandomSource = ThreadRng> {
    exchange: Exchange<C, R>,
    transport: T,
    /// Message the exchange asked to send that the transport has not taken yet.
    outgoing: Option<CoapMessage>,
    buffer_len: usize,
    stats: DriverStats,
}

impl<T: Transport, C: Clock, R: RandomSource> Driver<T, C, R> {
    pub fn new(exchange: Exchange<C, R>, transport: T, buffer_len: usize) -> Self {
        Self {
            exchange,
            transport,
            outgoing: None,
            buffer_len,
            stats: DriverStats::default(),
        }
    }

    pub fn exchange(&self) -> &Exchange<C, R> {
        &self.exchange
    }

    pub fn exchange_mut(&mut self) -> &mut Exchange<C, R> {
        &mut self.exchange
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    /// Start a locally initiated exchange for `msg`.
    pub fn start_client(
        &mut self,
        mut msg: CoapMessage,
        handlers: Box<dyn ExchangeHandlers>,
    ) -> Result<ExchangeState, NodeError> {
        let state = self
            .exchange
            .new_client_request(&mut msg, handlers, self.buffer_len)?;
        self.queue(state, msg);
        Ok(state)
    }

    /// Answer a peer request, typically one returned as [`PollStatus::Unhandled`].
    pub fn start_server(
        &mut self,
        response_code: Code,
        mut msg: CoapMessage,
        handlers: Box<dyn ExchangeHandlers>,
    ) -> Result<ExchangeState, NodeError> {
        let state =
            self.exchange
                .new_server_request(response_code, &mut msg, handlers, self.buffer_len)?;
        self.queue(state, msg);
        Ok(state)
    }

    /// Do all the work currently possible without waiting.
    ///
    /// Lets the exchange check its deadlines, flushes the pending outbound
    /// message, then consumes inbound messages until the transport stalls or
    /// runs dry.
    pub fn poll(&mut self) -> Result<PollStatus, NodeError> {
        let was_ongoing = self.exchange.is_ongoing();

        if was_ongoing {
            let mut msg = CoapMessage::default();
            let state = self.exchange.process(ExchangeEvent::None, &mut msg);
            self.queue(state, msg);
        }

        loop {
            if let Some(msg) = self.outgoing.take() {
                match self.transport.send(&msg).map_err(|e| self.transport_failed(e))? {
                    SendStatus::Sent => {
                        self.stats.sent += 1;
                        let mut msg = msg;
                        let state = self
                            .exchange
                            .process(ExchangeEvent::SendConfirmation, &mut msg);
                        self.queue(state, msg);
                        continue;
                    }
                    SendStatus::InProgress => {
                        tracing::trace!(mid = msg.message_id, "driver: send in progress");
                        self.outgoing = Some(msg);
                        break;
                    }
                }
            }

            let received = self
                .transport
                .receive()
                .map_err(|e| self.transport_failed(e))?;
            let Some(mut msg) = received else {
                break;
            };
            self.stats.received += 1;

            if self.answered_from_cache(&msg)? {
                continue;
            }
            if !self.exchange.is_ongoing() {
                if !is_peer_request(msg.operation) {
                    tracing::debug!(
                        mid = msg.message_id,
                        op = ?msg.operation,
                        "driver: dropping message outside an exchange"
                    );
                    continue;
                }
                return Ok(PollStatus::Unhandled(msg));
            }
            let state = self.exchange.process(ExchangeEvent::NewMessage, &mut msg);
            self.queue(state, msg);
        }

        Ok(match (was_ongoing, self.exchange.is_ongoing()) {
            (_, true) => PollStatus::Pending,
            (true, false) => PollStatus::Finished,
            (false, false) => PollStatus::Idle,
        })
    }

    /// Screen a peer request against the response cache.
    ///
    /// Returns `true` when the message was a duplicate and has been handled.
    fn answered_from_cache(&mut self, msg: &CoapMessage) -> Result<bool, NodeError> {
        if !is_peer_request(msg.operation) {
            return Ok(false);
        }
        match self.exchange.cache_check(msg.message_id) {
            CacheLookup::HitRecent => {
                if let Some(response) = self.exchange.cache_take_response() {
                    let status = self
                        .transport
                        .send(&response)
                        .map_err(|e| self.transport_failed(e))?;
                    if status == SendStatus::Sent {
                        tracing::debug!(mid = msg.message_id, "driver: resent cached response");
                        self.stats.sent += 1;
                        self.stats.resent_from_cache += 1;
                    } else {
                        // The peer repeats its request if this answer never arrives.
                        tracing::debug!(
                            mid = msg.message_id,
                            "driver: transport busy, cached response dropped"
                        );
                    }
                }
                Ok(true)
            }
            CacheLookup::HitNonRecent => {
                tracing::debug!(mid = msg.message_id, "driver: dropping stale duplicate");
                self.stats.dropped_duplicates += 1;
                Ok(true)
            }
            CacheLookup::Miss => Ok(false),
        }
    }

    /// End the running exchange with a network error and hand back `err`.
    fn transport_failed(&mut self, err: TransportError) -> NodeError {
        tracing::warn!(%err, "driver: transport failed");
        self.outgoing = None;
        self.exchange.terminate(TerminateReason::Network);
        err.into()
    }

    fn queue(&mut self, state: ExchangeState, msg: CoapMessage) {
        if state == ExchangeState::MsgToSend {
            self.outgoing = Some(msg);
        } else if state == ExchangeState::Finished {
            self.outgoing = None;
        }
    }
}

/// Requests and pings start server exchanges; everything else belongs to ours.
fn is_peer_request(operation: Operation) -> bool {
    !operation.is_response_or_signal() || operation == Operation::CoapPingUdp
}

impl<T: Transport, C: Clock, R: RandomSource> std::fmt::Debug for Driver<T, C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("exchange", &self.exchange)
            .field("outgoing", &self.outgoing.as_ref().map(|m| m.message_id))
            .field("buffer_len", &self.buffer_len)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
