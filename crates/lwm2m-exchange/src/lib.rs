//! CoAP exchange engine for an LwM2M client.
//!
//! This crate drives one request/response exchange at a time over CoAP:
//! retransmission with exponential backoff, block-wise transfer in both
//! directions, separate responses and duplicate-request suppression. It is
//! sans-IO: the caller owns the transport and the polling loop.

pub mod block;
pub mod cache;
pub mod error;
pub mod exchange;
pub mod handlers;
pub mod timing;

pub use block::{BlockSequencer, negotiate_block_size};
pub use cache::{CacheLookup, DEFAULT_CACHE_ENTRIES, ExchangeCache};
pub use error::ExchangeError;
pub use exchange::{Exchange, ExchangeEvent, ExchangeResult, ExchangeState, TerminateReason};
pub use handlers::{ExchangeHandlers, NoopHandlers, PayloadChunk, ReadOutcome};
pub use timing::{RetransmissionTimer, TimeoutOutcome, TxParams, exchange_lifetime};
