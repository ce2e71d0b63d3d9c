//! Exchange error types.
//!
//! These cover misuse of the engine (bad configuration, starting an exchange
//! while another is open) and failures while setting one up. How an exchange
//! ends is not an error: that is reported through
//! [`ExchangeResult`](crate::ExchangeResult) to the completion handler.

use std::time::Duration;

use lwm2m_core::RngError;

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("ACK timeout must be at least {min:?}, got {actual:?}")]
    InvalidAckTimeout { min: Duration, actual: Duration },

    #[error("ACK random factor must be finite and at least 1.0, got {0}")]
    InvalidRandomFactor(f64),

    #[error("server exchange timeout must be non-zero")]
    InvalidServerTimeout,

    #[error("cache needs at least one entry")]
    InvalidCacheCapacity,

    #[error("an exchange is already in progress")]
    InProgress,

    #[error("buffer too small: need at least {min} bytes, got {actual}")]
    BufferTooSmall { min: usize, actual: usize },

    #[error("notification must carry the observation token")]
    MissingNotifyToken,

    #[error("random source error: {0}")]
    Random(#[from] RngError),
}
