//! Structured CoAP message as exchanged with the codec.
//!
//! The exchange engine never touches wire bytes. It reads and rewrites the
//! fields of [`CoapMessage`] and leaves encoding to the codec layer.

use core::fmt;

use crate::codes::Code;
use crate::error::CoreError;
use crate::operation::Operation;

/// Maximum token length allowed by RFC 7252.
pub const MAX_TOKEN_LEN: usize = 8;

/// Helper to write lowercase hex.
fn fmt_hex(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for byte in bytes {
        write!(f, "{:02x}", byte)?;
    }
    Ok(())
}

// ======================================================================== //
// Token
// ======================================================================== //

/// Request/response correlation value, 0 to 8 opaque bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[must_use]
pub struct Token {
    bytes: [u8; MAX_TOKEN_LEN],
    len: u8,
}

impl Token {
    pub const EMPTY: Token = Token {
        bytes: [0; MAX_TOKEN_LEN],
        len: 0,
    };

    /// A full-length token.
    pub const fn new(bytes: [u8; MAX_TOKEN_LEN]) -> Self {
        Self {
            bytes,
            len: MAX_TOKEN_LEN as u8,
        }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for Token {
    fn as_ref(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl TryFrom<&[u8]> for Token {
    type Error = CoreError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() > MAX_TOKEN_LEN {
            return Err(CoreError::TokenTooLong {
                max: MAX_TOKEN_LEN,
                actual: bytes.len(),
            });
        }
        let mut token = Token::EMPTY;
        token.bytes[..bytes.len()].copy_from_slice(bytes);
        token.len = bytes.len() as u8;
        Ok(token)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hex(self.as_ref(), f)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(")?;
        fmt_hex(self.as_ref(), f)?;
        write!(f, ")")
    }
}

// ======================================================================== //
// Message type and block option
// ======================================================================== //

/// CoAP message type (RFC 7252 §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MessageType {
    #[default]
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

impl MessageType {
    /// The type the encoder puts on the wire for a given operation.
    pub fn for_operation(operation: Operation) -> Self {
        match operation {
            Operation::InfConNotify | Operation::CoapPingUdp => MessageType::Confirmable,
            Operation::InfNonConNotify | Operation::InfNonConSend => MessageType::NonConfirmable,
            Operation::Response | Operation::InfInitialNotify | Operation::CoapEmptyMsg => {
                MessageType::Acknowledgement
            }
            Operation::CoapReset => MessageType::Reset,
            _ => MessageType::Confirmable,
        }
    }
}

/// Which block option a message carries (RFC 7959).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Request payload is split.
    Block1,
    /// Response payload is split.
    Block2,
    /// Acknowledges the last BLOCK1 of an upload and opens a BLOCK2 download.
    Both,
}

/// A block option: kind, sequence number, size in bytes and the "more" flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockOption {
    pub kind: BlockKind,
    pub number: u32,
    pub size: u16,
    pub more: bool,
}

impl BlockOption {
    pub fn block1(number: u32, size: u16, more: bool) -> Self {
        Self {
            kind: BlockKind::Block1,
            number,
            size,
            more,
        }
    }

    pub fn block2(number: u32, size: u16, more: bool) -> Self {
        Self {
            kind: BlockKind::Block2,
            number,
            size,
            more,
        }
    }
}

/// Object path created by a CREATE request, reported in the Location-Path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CreatedPath {
    pub object_id: u16,
    pub instance_id: u16,
}

// ======================================================================== //
// CoapMessage
// ======================================================================== //

/// A decoded (or to-be-encoded) CoAP message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoapMessage {
    pub operation: Operation,
    pub msg_type: MessageType,
    pub message_id: u16,
    pub token: Token,
    pub code: Code,
    pub payload: Vec<u8>,
    pub content_format: Option<u16>,
    pub accept: Option<u16>,
    pub observe_number: Option<u32>,
    pub block: Option<BlockOption>,
    pub created_path: Option<CreatedPath>,
}

impl CoapMessage {
    /// A message for `operation` with the wire type the encoder would pick.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            msg_type: MessageType::for_operation(operation),
            ..Self::default()
        }
    }

    /// Change the operation and keep the message type consistent with it.
    pub fn set_operation(&mut self, operation: Operation) {
        self.operation = operation;
        self.msg_type = MessageType::for_operation(operation);
    }

    /// Block number, or 0 for a message without a block option.
    pub fn block_number(&self) -> u32 {
        self.block.map_or(0, |b| b.number)
    }

    pub fn block_more(&self) -> bool {
        self.block.is_some_and(|b| b.more)
    }

    pub fn block_kind(&self) -> Option<BlockKind> {
        self.block.map(|b| b.kind)
    }

    pub fn is_confirmable(&self) -> bool {
        self.msg_type == MessageType::Confirmable
    }
}
