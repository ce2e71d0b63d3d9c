//! Shared vocabulary for the LwM2M exchange engine.
//!
//! CoAP status codes, LwM2M operations, the structured message value the
//! engine reads and rewrites, and the clock and random-source seams it is
//! driven through.

pub mod codes;
pub mod error;
pub mod message;
pub mod operation;
pub mod random;
pub mod time;

pub use codes::Code;
pub use error::{CoreError, RngError};
pub use message::{
    BlockKind, BlockOption, CoapMessage, CreatedPath, MAX_TOKEN_LEN, MessageType, Token,
};
pub use operation::Operation;
pub use random::RandomSource;
pub use time::{Clock, ManualClock, SystemClock};
