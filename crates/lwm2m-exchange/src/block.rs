//! Block-wise transfer sequencing (RFC 7959).
//!
//! [`BlockSequencer`] tracks the negotiated block size, the current block
//! number and whether a transfer is open. [`produce_block`] runs one round of
//! the payload producer against the exchange buffer.

use lwm2m_core::{Code, CreatedPath};

use crate::handlers::{ExchangeHandlers, ReadOutcome};

/// Smallest block size (SZX 0).
pub const MIN_BLOCK_SIZE: usize = 16;

/// Largest block size (SZX 6).
pub const MAX_BLOCK_SIZE: usize = 1024;

/// Largest power of two in `[16, 1024]` that fits `buffer_len`, or 0 if the
/// buffer is smaller than 16 bytes.
pub fn negotiate_block_size(buffer_len: usize) -> u16 {
    if buffer_len < MIN_BLOCK_SIZE {
        return 0;
    }
    let mut size = MIN_BLOCK_SIZE;
    while size * 2 <= buffer_len && size < MAX_BLOCK_SIZE {
        size *= 2;
    }
    size as u16
}

/// Number of block rounds needed for `payload_len` bytes: at least one.
pub fn block_rounds(payload_len: usize, block_size: u16) -> usize {
    if block_size == 0 {
        return 0;
    }
    payload_len.div_ceil(usize::from(block_size)).max(1)
}

/// Block sequencing state of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockSequencer {
    size: u16,
    number: u32,
    active: bool,
}

impl BlockSequencer {
    /// Fresh sequencer for a new exchange using a buffer of `buffer_len` bytes.
    pub fn new(buffer_len: usize) -> Self {
        Self {
            size: negotiate_block_size(buffer_len),
            number: 0,
            active: false,
        }
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Whether a block-wise transfer is open.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Adopt a smaller block size requested by the peer.
    pub fn narrow_size(&mut self, requested: u16) {
        if requested != 0 && requested < self.size {
            self.size = requested;
        }
    }

    /// Whether `number` is the block we are currently waiting on.
    pub fn matches_current(&self, number: u32) -> bool {
        self.number == number
    }

    /// Accept `number` if it is the next expected block.
    ///
    /// On a mismatch nothing changes and `false` is returned.
    pub fn accept_next(&mut self, number: u32) -> bool {
        match self.number.checked_add(1) {
            Some(next) if next == number => {
                self.number = next;
                true
            }
            _ => false,
        }
    }

    /// Move to the next block and return its number.
    pub fn advance(&mut self) -> u32 {
        self.number = self.number.saturating_add(1);
        self.number
    }

    /// Close the transfer and rewind the block counter.
    pub fn finish(&mut self) {
        self.active = false;
        self.number = 0;
    }
}

/// One chunk pulled from a payload producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedBlock {
    pub payload: Vec<u8>,
    pub content_format: Option<u16>,
    pub created_path: Option<CreatedPath>,
    /// The producer has more data for further blocks.
    pub more: bool,
}

/// Run the producer once against `buf` and copy out what it wrote.
pub fn produce_block(
    handlers: &mut dyn ExchangeHandlers,
    buf: &mut [u8],
) -> Result<ProducedBlock, Code> {
    let (chunk, more) = match handlers.read_payload(buf)? {
        ReadOutcome::Complete(chunk) => (chunk, false),
        ReadOutcome::NeedMore(chunk) => (chunk, true),
    };
    if chunk.len > buf.len() {
        tracing::warn!(
            len = chunk.len,
            capacity = buf.len(),
            "exchange: producer reported more bytes than the buffer holds"
        );
    }
    let len = chunk.len.min(buf.len());
    Ok(ProducedBlock {
        payload: buf[..len].to_vec(),
        content_format: chunk.content_format,
        created_path: chunk.created_path,
        more,
    })
}
