//! The exchange state machine.
//!
//! An [`Exchange`] runs one CoAP request/response exchange at a time, either
//! initiated locally ([`Exchange::new_client_request`]) or answering a peer
//! ([`Exchange::new_server_request`]). It performs no I/O: the caller hands
//! every message it fills in to the transport, reports the send confirmation
//! and feeds inbound messages and timer ticks through [`Exchange::process`].
//! The returned [`ExchangeState`] says what the caller must do next.
//!
//! Internally the state is never [`ExchangeState::MsgToSend`]: that value is
//! only returned, and the exchange itself moves straight to waiting for the
//! send confirmation.

mod client;
mod server;
mod types;

pub use types::{ExchangeEvent, ExchangeResult, ExchangeState, TerminateReason};

use core::fmt;
use std::time::{Duration, Instant};

use lwm2m_core::{
    Clock, CoapMessage, Code, Operation, RandomSource, RngError, SystemClock, Token,
};
use rand::rngs::ThreadRng;

use crate::block::{BlockSequencer, MIN_BLOCK_SIZE, ProducedBlock, produce_block};
use crate::cache::{CacheLookup, ExchangeCache};
use crate::error::ExchangeError;
use crate::handlers::{ExchangeHandlers, NoopHandlers};
use crate::timing::{
    DEFAULT_SERVER_EXCHANGE_TIMEOUT, RetransmissionTimer, TimeoutOutcome, TxParams,
    initial_client_timeout,
};

/// Exchange context, reused for every exchange on one connection.
pub struct Exchange<C: Clock = SystemClock, R: RandomSource = ThreadRng> {
    state: ExchangeState,
    handlers: Box<dyn ExchangeHandlers>,
    /// Cleared once the completion handler has run.
    completion_pending: bool,

    // ---- Role and reliability ----
    server_request: bool,
    confirmable: bool,
    /// A follow-up request is ready but waits for our empty ACK to go out.
    request_prepared: bool,
    op: Operation,
    msg_code: Code,

    // ---- Payload ----
    blocks: BlockSequencer,
    payload_buf: Vec<u8>,
    /// Last request (client role) kept for retransmission.
    base_msg: CoapMessage,

    // ---- Timing ----
    timer: RetransmissionTimer,
    tx_params: TxParams,
    server_exchange_timeout: Duration,

    msg_id: u16,
    cache: Option<ExchangeCache>,
    clock: C,
    rng: R,
}

impl Exchange {
    /// Exchange context on the system clock and the thread-local RNG.
    pub fn with_system_clock() -> Result<Self, ExchangeError> {
        Self::new(SystemClock, rand::thread_rng())
    }
}

impl<C: Clock, R: RandomSource> Exchange<C, R> {
    /// Create an idle exchange context with default transmission parameters.
    ///
    /// The message-id counter is seeded from `rng`.
    pub fn new(clock: C, mut rng: R) -> Result<Self, ExchangeError> {
        let msg_id = rng.random_u16()?;
        let now = clock.now();
        tracing::debug!(mid_seed = msg_id, "exchange: init");
        Ok(Self {
            state: ExchangeState::Finished,
            handlers: Box::new(NoopHandlers),
            completion_pending: false,
            server_request: false,
            confirmable: false,
            request_prepared: false,
            op: Operation::None,
            msg_code: Code::EMPTY,
            blocks: BlockSequencer::default(),
            payload_buf: Vec::new(),
            base_msg: CoapMessage::default(),
            timer: RetransmissionTimer::new(now),
            tx_params: TxParams::default(),
            server_exchange_timeout: DEFAULT_SERVER_EXCHANGE_TIMEOUT,
            msg_id,
            cache: None,
            clock,
            rng,
        })
    }

    // ------------------------------------------------------------------ //
    // Accessors and configuration
    // ------------------------------------------------------------------ //

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Whether an exchange is in progress.
    pub fn is_ongoing(&self) -> bool {
        self.state != ExchangeState::Finished
    }

    pub fn tx_params(&self) -> &TxParams {
        &self.tx_params
    }

    /// Replace the transmission parameters; invalid ones leave the old set.
    pub fn set_tx_params(&mut self, params: TxParams) -> Result<(), ExchangeError> {
        params.validate()?;
        tracing::debug!(
            ack_timeout = ?params.ack_timeout,
            ack_random_factor = params.ack_random_factor,
            max_retransmit = params.max_retransmit,
            "exchange: tx params updated"
        );
        self.tx_params = params;
        Ok(())
    }

    pub fn server_request_timeout(&self) -> Duration {
        self.server_exchange_timeout
    }

    pub fn set_server_request_timeout(&mut self, timeout: Duration) -> Result<(), ExchangeError> {
        if timeout.is_zero() {
            return Err(ExchangeError::InvalidServerTimeout);
        }
        self.server_exchange_timeout = timeout;
        Ok(())
    }

    /// Attach a response cache, clearing whatever it held.
    pub fn setup_cache(&mut self, mut cache: ExchangeCache) {
        cache.invalidate();
        tracing::debug!(entries = cache.capacity(), "exchange: cache attached");
        self.cache = Some(cache);
    }

    pub fn cache(&self) -> Option<&ExchangeCache> {
        self.cache.as_ref()
    }

    /// Look up an inbound request in the response cache.
    ///
    /// Always [`CacheLookup::Miss`] without a cache.
    pub fn cache_check(&mut self, message_id: u16) -> CacheLookup {
        let now = self.clock.now();
        self.cache
            .as_mut()
            .map_or(CacheLookup::Miss, |cache| cache.check(message_id, now))
    }

    /// Cached response for the duplicate found by the last [`cache_check`](Self::cache_check).
    pub fn cache_take_response(&mut self) -> Option<CoapMessage> {
        self.cache.as_mut().and_then(ExchangeCache::take_response)
    }

    pub fn blocks(&self) -> &BlockSequencer {
        &self.blocks
    }

    pub fn timer(&self) -> &RetransmissionTimer {
        &self.timer
    }

    /// Operation of the running (or last) exchange.
    pub fn operation(&self) -> Operation {
        self.op
    }

    // ------------------------------------------------------------------ //
    // Driving
    // ------------------------------------------------------------------ //

    /// Advance the exchange.
    ///
    /// `msg` is the caller's message buffer: it is read on
    /// [`ExchangeEvent::NewMessage`] and overwritten whenever
    /// [`ExchangeState::MsgToSend`] is returned.
    pub fn process(&mut self, event: ExchangeEvent, msg: &mut CoapMessage) -> ExchangeState {
        let now = self.clock.now();

        match self.state {
            ExchangeState::Finished => return ExchangeState::Finished,
            ExchangeState::WaitingSendConfirmation | ExchangeState::MsgToSend => {
                self.handle_send_confirmation(event, now);
                if self.state == ExchangeState::WaitingMsg && self.request_prepared {
                    self.request_prepared = false;
                    *msg = self.base_msg.clone();
                    self.state = ExchangeState::WaitingSendConfirmation;
                    self.timer.reset(now);
                    self.timer.refresh_send_confirmation(now);
                    tracing::debug!(mid = msg.message_id, "exchange: sending prepared request");
                    return ExchangeState::MsgToSend;
                }
                return self.state;
            }
            ExchangeState::WaitingMsg => {}
        }

        if event == ExchangeEvent::NewMessage {
            if self.server_request {
                self.handle_server_request(msg);
            } else {
                self.handle_server_response(msg);
            }
            match self.state {
                ExchangeState::WaitingSendConfirmation => {
                    self.timer.refresh_send_confirmation(now);
                    return ExchangeState::MsgToSend;
                }
                ExchangeState::WaitingMsg => {}
                other => return other,
            }
        }

        if self.timer.is_expired(now) {
            if self.server_request {
                tracing::warn!(op = ?self.op, "exchange: peer did not continue in time");
                self.finalize(None, ExchangeResult::Timeout);
                return ExchangeState::Finished;
            }
            match self.timer.on_timeout(now, self.tx_params.max_retransmit) {
                TimeoutOutcome::Retry { retry, .. } => {
                    self.state = ExchangeState::WaitingSendConfirmation;
                    *msg = self.base_msg.clone();
                    tracing::info!(mid = msg.message_id, retry, "exchange: retransmitting");
                    return ExchangeState::MsgToSend;
                }
                TimeoutOutcome::Fail => {
                    tracing::warn!(
                        mid = self.base_msg.message_id,
                        "exchange: no response after retransmissions"
                    );
                    self.finalize(None, ExchangeResult::Timeout);
                    return ExchangeState::Finished;
                }
            }
        }

        ExchangeState::WaitingMsg
    }

    /// Force the running exchange to end; a no-op when none is running.
    pub fn terminate(&mut self, reason: TerminateReason) {
        if self.state == ExchangeState::Finished {
            return;
        }
        tracing::warn!(?reason, op = ?self.op, "exchange: terminated");
        self.finalize(None, reason.into());
    }

    // ------------------------------------------------------------------ //
    // Shared internals
    // ------------------------------------------------------------------ //

    /// Reset per-exchange state for a new exchange.
    fn begin(
        &mut self,
        handlers: Box<dyn ExchangeHandlers>,
        buffer_len: usize,
    ) -> Result<(), ExchangeError> {
        if self.state != ExchangeState::Finished {
            return Err(ExchangeError::InProgress);
        }
        if buffer_len < MIN_BLOCK_SIZE {
            return Err(ExchangeError::BufferTooSmall {
                min: MIN_BLOCK_SIZE,
                actual: buffer_len,
            });
        }
        self.handlers = handlers;
        self.completion_pending = true;
        self.request_prepared = false;
        self.msg_code = Code::EMPTY;
        self.blocks = BlockSequencer::new(buffer_len);
        self.payload_buf.clear();
        self.payload_buf.resize(usize::from(self.blocks.size()), 0);
        self.base_msg = CoapMessage::default();
        Ok(())
    }

    /// Start the response deadline for the exchange's role.
    fn arm_timer(&mut self) -> Result<(), RngError> {
        let timeout = if self.server_request {
            self.server_exchange_timeout
        } else {
            initial_client_timeout(&self.tx_params, self.rng.random_u32()?)
        };
        self.timer.arm(timeout, self.clock.now());
        Ok(())
    }

    fn next_message_id(&mut self) -> u16 {
        self.msg_id = self.msg_id.wrapping_add(1);
        self.msg_id
    }

    fn next_token(&mut self) -> Result<Token, RngError> {
        self.rng.random_token()
    }

    fn read_block(&mut self) -> Result<ProducedBlock, Code> {
        let size = usize::from(self.blocks.size()).min(self.payload_buf.len());
        produce_block(self.handlers.as_mut(), &mut self.payload_buf[..size])
    }

    fn record_response(&mut self, response: &CoapMessage) {
        let now = self.clock.now();
        if let Some(cache) = self.cache.as_mut() {
            cache.add(&self.tx_params, now, response);
        }
    }

    fn handle_send_confirmation(&mut self, event: ExchangeEvent, now: Instant) {
        if self.timer.send_confirmation_expired(now) {
            tracing::warn!(op = ?self.op, "exchange: send not confirmed in time");
            self.finalize(None, ExchangeResult::Timeout);
            return;
        }
        if event != ExchangeEvent::SendConfirmation {
            return;
        }
        if !self.confirmable && !self.blocks.is_active() {
            let result = if self.msg_code.is_error() {
                ExchangeResult::Request
            } else {
                ExchangeResult::Success
            };
            self.finalize(None, result);
        } else {
            self.state = ExchangeState::WaitingMsg;
        }
    }

    /// Answer an unexpected request with 5.03 without touching the exchange.
    fn reply_service_unavailable(&mut self, msg: &mut CoapMessage) {
        tracing::warn!(
            mid = msg.message_id,
            op = ?msg.operation,
            "exchange: request does not belong to this exchange, answering 5.03"
        );
        self.state = ExchangeState::WaitingSendConfirmation;
        msg.set_operation(Operation::Response);
        msg.code = Code::SERVICE_UNAVAILABLE;
        msg.payload.clear();
        msg.block = None;
        msg.content_format = None;
        self.record_response(msg);
    }

    /// Run the completion handler if it has not run yet.
    fn complete(&mut self, response: Option<&CoapMessage>, result: ExchangeResult) {
        if std::mem::take(&mut self.completion_pending) {
            self.handlers.on_completion(response, result);
        }
    }

    fn finalize(&mut self, response: Option<&CoapMessage>, result: ExchangeResult) {
        if result.is_success() {
            tracing::info!(op = ?self.op, "exchange: finished");
        } else {
            tracing::info!(op = ?self.op, %result, "exchange: failed");
        }
        self.complete(response, result);
        self.handlers = Box::new(NoopHandlers);
        self.state = ExchangeState::Finished;
        self.blocks.set_active(false);
        self.request_prepared = false;
    }
}

impl<C: Clock, R: RandomSource> fmt::Debug for Exchange<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("state", &self.state)
            .field("op", &self.op)
            .field("server_request", &self.server_request)
            .field("confirmable", &self.confirmable)
            .field("blocks", &self.blocks)
            .field("timer", &self.timer)
            .field("msg_id", &self.msg_id)
            .finish_non_exhaustive()
    }
}
