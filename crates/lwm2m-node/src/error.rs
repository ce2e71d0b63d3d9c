//! Error types for the node layer.

use lwm2m_exchange::ExchangeError;

use crate::transport::TransportError;

/// Errors that can occur while configuring or driving an exchange.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
