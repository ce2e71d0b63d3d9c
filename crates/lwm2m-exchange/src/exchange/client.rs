//! Client role: requests we send and the responses that come back.

use std::time::Instant;

use lwm2m_core::{
    BlockKind, BlockOption, Clock, CoapMessage, Code, Operation, RandomSource, Token,
};

use super::{Exchange, ExchangeResult, ExchangeState};
use crate::error::ExchangeError;
use crate::handlers::ExchangeHandlers;

impl<C: Clock, R: RandomSource> Exchange<C, R> {
    /// Start a locally initiated exchange.
    ///
    /// `msg` carries the operation (and, for notifications, the observation
    /// token); on [`ExchangeState::MsgToSend`] it holds the request to send.
    /// `buffer_len` is the capacity of the caller's message buffer and bounds
    /// the block size. Failures after the exchange has been set up are
    /// reported through the completion handler and return
    /// [`ExchangeState::Finished`].
    pub fn new_client_request(
        &mut self,
        msg: &mut CoapMessage,
        handlers: Box<dyn ExchangeHandlers>,
        buffer_len: usize,
    ) -> Result<ExchangeState, ExchangeError> {
        let operation = msg.operation;
        if operation.is_notify() && msg.token.is_empty() {
            return Err(ExchangeError::MissingNotifyToken);
        }
        self.begin(handlers, buffer_len)?;
        self.server_request = false;
        self.op = operation;
        self.confirmable = !matches!(
            operation,
            Operation::InfNonConSend | Operation::InfNonConNotify
        );
        msg.set_operation(operation);

        // Notifications reuse the token of the observation.
        if !operation.is_notify() {
            match self.next_token() {
                Ok(token) => msg.token = token,
                Err(err) => {
                    tracing::warn!(%err, "exchange: token generation failed");
                    self.finalize(None, ExchangeResult::Request);
                    return Ok(ExchangeState::Finished);
                }
            }
        }
        msg.message_id = self.next_message_id();

        if let Err(err) = self.arm_timer() {
            tracing::warn!(%err, "exchange: timeout randomization failed");
            self.finalize(None, ExchangeResult::Request);
            return Ok(ExchangeState::Finished);
        }

        let block = match self.read_block() {
            Ok(block) => block,
            Err(code) => {
                tracing::warn!(%code, ?operation, "exchange: reading request payload failed");
                self.finalize(None, ExchangeResult::Request);
                return Ok(ExchangeState::Finished);
            }
        };
        msg.payload = block.payload;
        msg.content_format = block.content_format;

        if block.more {
            self.blocks.set_active(true);
            msg.block = Some(BlockOption::block1(0, self.blocks.size(), true));

            match operation {
                // Only confirmable exchanges can carry a block-wise transfer.
                Operation::InfNonConSend => {
                    tracing::debug!("exchange: non-confirmable send promoted to confirmable");
                    self.op = Operation::InfConSend;
                    self.confirmable = true;
                    msg.set_operation(Operation::InfConSend);
                }
                // A large notification is served as a BLOCK2 read driven by the peer.
                Operation::InfConNotify | Operation::InfNonConNotify => {
                    tracing::debug!("exchange: notification continues as block-wise read");
                    self.op = Operation::InfNonConNotify;
                    self.confirmable = false;
                    self.server_request = true;
                    msg.set_operation(Operation::InfNonConNotify);
                    if let Some(option) = msg.block.as_mut() {
                        option.kind = BlockKind::Block2;
                    }
                    if let Err(err) = self.arm_timer() {
                        tracing::warn!(%err, "exchange: timer setup failed");
                        self.finalize(None, ExchangeResult::Request);
                        return Ok(ExchangeState::Finished);
                    }
                }
                _ => {}
            }
        }

        self.state = ExchangeState::WaitingSendConfirmation;
        self.base_msg = msg.clone();
        tracing::debug!(
            op = ?self.op,
            mid = msg.message_id,
            token = %msg.token,
            len = msg.payload.len(),
            block_transfer = self.blocks.is_active(),
            "exchange: client request ready"
        );
        Ok(ExchangeState::MsgToSend)
    }

    /// Handle a message received while waiting for the peer's response.
    pub(super) fn handle_server_response(&mut self, msg: &mut CoapMessage) {
        let now = self.clock.now();

        match msg.operation {
            Operation::CoapEmptyMsg => {
                if self.base_msg.operation == Operation::InfConNotify {
                    self.finalize(Some(&*msg), ExchangeResult::Success);
                } else {
                    tracing::debug!(
                        mid = msg.message_id,
                        "exchange: empty ACK, waiting for separate response"
                    );
                    self.timer.reset(now);
                }
                return;
            }
            Operation::CoapReset => {
                tracing::warn!(mid = msg.message_id, "exchange: peer reset the exchange");
                self.finalize(Some(&*msg), ExchangeResult::ServerResponse);
                return;
            }
            _ => {}
        }

        if msg.token != self.base_msg.token {
            if msg.code > Code::IPATCH {
                tracing::debug!(token = %msg.token, "exchange: ignoring response with unknown token");
            } else {
                self.reply_service_unavailable(msg);
            }
            return;
        }

        if msg.code.is_error() {
            tracing::warn!(code = %msg.code, "exchange: error response");
            self.finalize(Some(&*msg), ExchangeResult::ServerResponse);
            return;
        }

        if !self.blocks.matches_current(msg.block_number()) {
            tracing::warn!(
                expected = self.blocks.number(),
                got = msg.block_number(),
                "exchange: ignoring unexpected block"
            );
            return;
        }

        let transfer_open = match msg.block_kind() {
            Some(BlockKind::Block2) => msg.block_more(),
            Some(BlockKind::Block1) => self.blocks.is_active(),
            _ => false,
        };
        self.blocks.set_active(transfer_open);
        self.base_msg.payload.clear();

        if !msg.payload.is_empty() {
            let written = self.handlers.write_payload(&msg.payload, !transfer_open);
            let number = self.blocks.advance();
            let size = msg.block.map_or(self.blocks.size(), |option| option.size);
            self.base_msg.block = Some(BlockOption::block2(number, size, false));
            if let Err(code) = written {
                tracing::warn!(%code, "exchange: writing response payload failed");
                self.finalize(None, ExchangeResult::Request);
                return;
            }
        } else if transfer_open {
            match self.read_block() {
                Ok(block) => {
                    let number = self.blocks.advance();
                    self.base_msg.block =
                        Some(BlockOption::block1(number, self.blocks.size(), block.more));
                    self.base_msg.payload = block.payload;
                    self.base_msg.content_format = block.content_format;
                    self.blocks.set_active(block.more);
                }
                Err(code) => {
                    tracing::warn!(%code, "exchange: reading next block failed");
                    self.finalize(None, ExchangeResult::Request);
                    return;
                }
            }
        }

        if self.blocks.is_active() || !self.base_msg.payload.is_empty() {
            self.prepare_next_request(msg, now);
            return;
        }

        if msg.is_confirmable() {
            // Separate response: report it, then acknowledge it.
            self.complete(Some(&*msg), ExchangeResult::Success);
            self.confirmable = false;
            self.send_empty_ack(msg);
        } else {
            self.finalize(Some(&*msg), ExchangeResult::Success);
        }
    }

    /// Turn the base message into the next request of a block transfer.
    fn prepare_next_request(&mut self, msg: &mut CoapMessage, now: Instant) {
        self.base_msg.message_id = self.next_message_id();
        match self.next_token() {
            Ok(token) => self.base_msg.token = token,
            Err(err) => {
                tracing::warn!(%err, "exchange: token generation failed");
                self.finalize(None, ExchangeResult::Request);
                return;
            }
        }

        // A separate response must be acknowledged before the next request.
        if !self.request_prepared && msg.is_confirmable() {
            self.request_prepared = true;
            self.send_empty_ack(msg);
            return;
        }

        self.state = ExchangeState::WaitingSendConfirmation;
        self.timer.reset(now);
        *msg = self.base_msg.clone();
        tracing::debug!(
            mid = msg.message_id,
            block = msg.block_number(),
            "exchange: next block request"
        );
    }

    fn send_empty_ack(&mut self, msg: &mut CoapMessage) {
        self.state = ExchangeState::WaitingSendConfirmation;
        msg.set_operation(Operation::CoapEmptyMsg);
        msg.code = Code::EMPTY;
        msg.token = Token::EMPTY;
        msg.payload.clear();
        msg.block = None;
        msg.content_format = None;
        tracing::debug!(mid = msg.message_id, "exchange: acknowledging separate response");
    }
}
