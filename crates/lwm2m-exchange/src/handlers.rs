//! Payload and completion handlers supplied for one exchange.

use lwm2m_core::{CoapMessage, Code, CreatedPath};

use crate::exchange::ExchangeResult;

/// Metadata of a chunk written into the exchange buffer by a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PayloadChunk {
    /// Bytes written at the start of the buffer.
    pub len: usize,
    pub content_format: Option<u16>,
    /// Set by a CREATE handler to report the new instance.
    pub created_path: Option<CreatedPath>,
}

impl PayloadChunk {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            ..Self::default()
        }
    }

    pub fn with_content_format(mut self, format: u16) -> Self {
        self.content_format = Some(format);
        self
    }

    pub fn with_created_path(mut self, path: CreatedPath) -> Self {
        self.created_path = Some(path);
        self
    }
}

/// Result of a successful payload read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The chunk completes the payload.
    Complete(PayloadChunk),
    /// The buffer was filled and more data remains for another block.
    NeedMore(PayloadChunk),
}

/// Callbacks the exchange drives while it runs.
///
/// Every method has a default: reading produces an empty payload, writing
/// accepts and discards, completion is ignored. Errors are CoAP codes; on
/// the server side they become the response code.
pub trait ExchangeHandlers {
    /// Fill `buf` with the next chunk of outgoing payload.
    fn read_payload(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, Code> {
        let _ = buf;
        Ok(ReadOutcome::Complete(PayloadChunk::default()))
    }

    /// Consume one chunk of incoming payload.
    ///
    /// `last_block` is set on the final call of a transfer so
    /// transfer-scoped resources can be released.
    fn write_payload(&mut self, payload: &[u8], last_block: bool) -> Result<(), Code> {
        let _ = (payload, last_block);
        Ok(())
    }

    /// Called exactly once when the exchange finishes.
    fn on_completion(&mut self, response: Option<&CoapMessage>, result: ExchangeResult) {
        let _ = (response, result);
    }
}

/// Handlers that do nothing; installed while no exchange is running.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandlers;

impl ExchangeHandlers for NoopHandlers {}
