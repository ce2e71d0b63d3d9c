//! CoAP transmission constants (RFC 7252 §4.8).

use std::time::Duration;

/// Default ACK_TIMEOUT.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Default ACK_RANDOM_FACTOR.
pub const DEFAULT_ACK_RANDOM_FACTOR: f64 = 1.5;

/// Default MAX_RETRANSMIT.
pub const DEFAULT_MAX_RETRANSMIT: u16 = 4;

/// Smallest ACK_TIMEOUT accepted by the setter.
pub const MIN_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a server-role exchange waits for the peer's next block.
pub const DEFAULT_SERVER_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(50);

/// Window in which the transport must confirm a handed-over message.
pub const PROCESSING_DELAY: Duration = Duration::from_secs(2);

/// MAX_LATENCY.
pub const MAX_LATENCY: Duration = Duration::from_secs(100);

/// Furthest a deadline is ever scheduled; longer timeouts are clamped to it.
pub const MAX_DEADLINE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);
