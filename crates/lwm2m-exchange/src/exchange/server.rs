//! Server role: requests from the peer and the responses we build for them.

use lwm2m_core::{
    BlockKind, BlockOption, Clock, CoapMessage, Code, Operation, RandomSource, Token,
};

use super::{Exchange, ExchangeState};
use crate::error::ExchangeError;
use crate::handlers::ExchangeHandlers;

impl<C: Clock, R: RandomSource> Exchange<C, R> {
    /// Start an exchange answering the peer request in `msg`.
    ///
    /// `response_code` is the code chosen by the layer that dispatched the
    /// request; an error code skips the payload handlers entirely. On
    /// return `msg` holds the response, which has also been recorded in the
    /// cache. A UDP ping is answered with a reset and not cached.
    pub fn new_server_request(
        &mut self,
        response_code: Code,
        msg: &mut CoapMessage,
        handlers: Box<dyn ExchangeHandlers>,
        buffer_len: usize,
    ) -> Result<ExchangeState, ExchangeError> {
        self.begin(handlers, buffer_len)?;
        self.server_request = true;
        self.confirmable = false;
        self.op = msg.operation;
        self.msg_code = response_code;
        let request_op = msg.operation;
        tracing::debug!(
            op = ?request_op,
            mid = msg.message_id,
            code = %response_code,
            "exchange: new server request"
        );

        let outcome = match self.arm_timer() {
            Err(err) => {
                tracing::warn!(%err, "exchange: timer setup failed");
                Err(Code::INTERNAL_SERVER_ERROR)
            }
            Ok(()) if request_op == Operation::CoapPingUdp => {
                msg.set_operation(Operation::CoapReset);
                msg.code = Code::EMPTY;
                msg.token = Token::EMPTY;
                msg.payload.clear();
                msg.block = None;
                self.state = ExchangeState::WaitingSendConfirmation;
                tracing::debug!(mid = msg.message_id, "exchange: answering ping with reset");
                return Ok(ExchangeState::MsgToSend);
            }
            Ok(()) => {
                msg.set_operation(request_op.response_operation());
                self.first_response(response_code, msg)
            }
        };

        if let Err(code) = outcome {
            msg.set_operation(request_op.response_operation());
            self.error_response(msg, code);
        }

        self.state = ExchangeState::WaitingSendConfirmation;
        self.record_response(msg);
        tracing::debug!(
            mid = msg.message_id,
            code = %msg.code,
            block_transfer = self.blocks.is_active(),
            "exchange: server response ready"
        );
        Ok(ExchangeState::MsgToSend)
    }

    /// Build the response to the first message of a peer request.
    fn first_response(&mut self, response_code: Code, msg: &mut CoapMessage) -> Result<(), Code> {
        if response_code.is_error() {
            return Err(response_code);
        }

        let payload = std::mem::take(&mut msg.payload);
        let upload_open =
            msg.block_kind() == Some(BlockKind::Block1) && msg.block_more() && !payload.is_empty();
        self.blocks.set_active(upload_open);
        msg.code = if upload_open {
            Code::CONTINUE
        } else {
            response_code
        };
        msg.content_format = None;

        if !payload.is_empty() {
            self.handlers.write_payload(&payload, !upload_open)?;
        }
        if upload_open {
            return Ok(());
        }

        if let Some(option) = msg.block.filter(|option| option.kind == BlockKind::Block2) {
            self.blocks.narrow_size(option.size);
        }
        let block = self.read_block()?;
        msg.payload = block.payload;
        msg.content_format = block.content_format;
        msg.created_path = block.created_path;
        if block.more {
            self.blocks.set_active(true);
            msg.block = Some(BlockOption::block2(0, self.blocks.size(), true));
        } else {
            msg.block = None;
        }
        Ok(())
    }

    /// Handle a follow-up message from the peer while serving its request.
    pub(super) fn handle_server_request(&mut self, msg: &mut CoapMessage) {
        let now = self.clock.now();

        let same_request = msg.operation == self.op
            || (self.op.accepts_read_continuation() && msg.operation.is_read());
        if !same_request {
            if msg.operation.is_response_or_signal() {
                // CoAP forbids resetting an ACK, so stray responses are dropped.
                tracing::debug!(op = ?msg.operation, "exchange: ignoring unrelated message");
            } else {
                self.reply_service_unavailable(msg);
            }
            return;
        }

        if !self.blocks.accept_next(msg.block_number()) {
            tracing::warn!(
                expected = self.blocks.number().saturating_add(1),
                got = msg.block_number(),
                "exchange: ignoring unexpected block"
            );
            return;
        }

        let request_op = msg.operation;
        let response_code = self.next_response(msg).unwrap_or_else(|code| code);

        self.state = ExchangeState::WaitingSendConfirmation;
        self.timer.reset(now);
        msg.set_operation(request_op.response_operation());
        if response_code.is_error() {
            self.error_response(msg, response_code);
        } else {
            msg.code = response_code;
        }
        self.record_response(msg);
        tracing::debug!(
            mid = msg.message_id,
            code = %msg.code,
            block = self.blocks.number(),
            "exchange: server response ready"
        );
    }

    /// Consume the next inbound block and produce the next outbound one.
    ///
    /// Returns the response code; `Err` carries a handler error code.
    fn next_response(&mut self, msg: &mut CoapMessage) -> Result<Code, Code> {
        let mut response_code = Code::EMPTY;

        let payload = std::mem::take(&mut msg.payload);
        if !payload.is_empty() {
            if !msg.block_more() {
                self.blocks.finish();
            }
            self.handlers
                .write_payload(&payload, !self.blocks.is_active())?;
            response_code = if self.blocks.is_active() {
                Code::CONTINUE
            } else {
                self.msg_code
            };
        }
        if response_code == Code::CONTINUE {
            msg.content_format = None;
            return Ok(response_code);
        }

        let block = self.read_block()?;
        msg.content_format = block.content_format;
        msg.created_path = block.created_path;
        if block.more {
            self.blocks.set_active(true);
            if msg.block_kind() == Some(BlockKind::Block1) {
                // Last BLOCK1 of the upload, first BLOCK2 of the answer.
                if let Some(option) = msg.block.as_mut() {
                    option.kind = BlockKind::Both;
                    option.size = self.blocks.size();
                }
            } else {
                msg.block = Some(BlockOption::block2(
                    self.blocks.number(),
                    self.blocks.size(),
                    true,
                ));
            }
        } else {
            if let Some(option) = msg.block.as_mut() {
                option.more = false;
            }
            self.blocks.set_active(false);
        }

        if !block.payload.is_empty() {
            response_code = Code::CONTENT;
        }
        msg.payload = block.payload;
        Ok(response_code)
    }

    fn error_response(&mut self, msg: &mut CoapMessage, code: Code) {
        tracing::warn!(%code, mid = msg.message_id, "exchange: answering with error");
        msg.code = code;
        msg.payload.clear();
        msg.block = None;
        msg.content_format = None;
        self.blocks.set_active(false);
        self.msg_code = code;
    }
}
