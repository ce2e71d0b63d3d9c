//! Retransmission timing.
//!
//! Pure functions compute the randomized initial timeout, the exponential
//! backoff and the exchange lifetime from [`TxParams`].
//! [`RetransmissionTimer`] wraps them into the deadlines one exchange tracks:
//! the response deadline and the shorter send-confirmation window.

pub mod constants;
pub mod params;

use std::time::{Duration, Instant};

pub use constants::*;
pub use params::TxParams;

// ======================================================================== //
// Pure functions
// ======================================================================== //

/// Initial ACK timeout for a client request.
///
/// `sample` is a uniform random draw; it maps linearly onto
/// `[ack_timeout, ack_timeout * ack_random_factor]`.
pub fn initial_client_timeout(params: &TxParams, sample: u32) -> Duration {
    let fraction = f64::from(sample) / f64::from(u32::MAX);
    let multiplier = 1.0 + fraction * (params.ack_random_factor - 1.0);
    scale(params.ack_timeout, multiplier)
}

/// Timeout in force after `retry` retransmissions: `initial * 2^retry`.
pub fn retransmit_timeout(initial: Duration, retry: u16) -> Duration {
    let factor = 1u32.checked_shl(u32::from(retry)).unwrap_or(u32::MAX);
    initial.saturating_mul(factor)
}

/// EXCHANGE_LIFETIME (RFC 7252 §4.8.2).
///
/// `ack_timeout * (2^max_retransmit - 1) * ack_random_factor
///  + 2 * MAX_LATENCY + ack_timeout`
pub fn exchange_lifetime(params: &TxParams) -> Duration {
    let spans = 2f64.powi(i32::from(params.max_retransmit)) - 1.0;
    let max_transmit_span = scale(params.ack_timeout, spans * params.ack_random_factor);
    max_transmit_span
        .saturating_add(MAX_LATENCY * 2)
        .saturating_add(params.ack_timeout)
}

/// `duration * factor`, saturating at [`Duration::MAX`].
fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// `now + timeout`, clamped to [`MAX_DEADLINE`] past `now`.
pub fn deadline(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout.min(MAX_DEADLINE)).unwrap_or(now)
}

/// What to do when the response deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    /// Resend; `retry` is the retransmission count after this timeout.
    Retry { retry: u16, timeout: Duration },
    /// Retransmissions exhausted.
    Fail,
}

/// Decide the outcome of a response timeout.
pub fn compute_timeout_outcome(
    initial: Duration,
    retry_count: u16,
    max_retransmit: u16,
) -> TimeoutOutcome {
    if retry_count >= max_retransmit {
        return TimeoutOutcome::Fail;
    }
    let retry = retry_count + 1;
    TimeoutOutcome::Retry {
        retry,
        timeout: retransmit_timeout(initial, retry),
    }
}

// ======================================================================== //
// RetransmissionTimer
// ======================================================================== //

/// Deadlines of the exchange in progress.
#[derive(Debug, Clone)]
pub struct RetransmissionTimer {
    retry_count: u16,
    timeout: Duration,
    timeout_at: Instant,
    send_confirmation_at: Instant,
}

impl RetransmissionTimer {
    pub fn new(now: Instant) -> Self {
        Self {
            retry_count: 0,
            timeout: Duration::ZERO,
            timeout_at: now,
            send_confirmation_at: now,
        }
    }

    /// Start timing a new exchange with `timeout` as its initial timeout.
    pub fn arm(&mut self, timeout: Duration, now: Instant) {
        self.retry_count = 0;
        self.timeout = timeout;
        self.timeout_at = deadline(now, timeout);
        self.send_confirmation_at = now + PROCESSING_DELAY;
        tracing::trace!(?timeout, "exchange: timer armed");
    }

    /// Restart the response deadline from `now` and forget earlier retries.
    pub fn reset(&mut self, now: Instant) {
        self.timeout_at = deadline(now, self.timeout);
        self.retry_count = 0;
    }

    /// Open a new send-confirmation window.
    pub fn refresh_send_confirmation(&mut self, now: Instant) {
        self.send_confirmation_at = now + PROCESSING_DELAY;
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.timeout_at
    }

    pub fn send_confirmation_expired(&self, now: Instant) -> bool {
        now >= self.send_confirmation_at
    }

    /// Handle an expired response deadline.
    ///
    /// On [`TimeoutOutcome::Retry`] the deadline is pushed out by the doubled
    /// timeout and a new send-confirmation window is opened.
    pub fn on_timeout(&mut self, now: Instant, max_retransmit: u16) -> TimeoutOutcome {
        let outcome = compute_timeout_outcome(self.timeout, self.retry_count, max_retransmit);
        if let TimeoutOutcome::Retry { retry, timeout } = outcome {
            self.retry_count = retry;
            self.timeout_at = deadline(now, timeout);
            self.refresh_send_confirmation(now);
            tracing::debug!(retry, ?timeout, "exchange: retransmission scheduled");
        }
        outcome
    }

    pub fn retry_count(&self) -> u16 {
        self.retry_count
    }

    /// Initial timeout of the exchange, before any backoff.
    pub fn initial_timeout(&self) -> Duration {
        self.timeout
    }

    /// Timeout currently in force, including backoff.
    pub fn current_timeout(&self) -> Duration {
        retransmit_timeout(self.timeout, self.retry_count)
    }

    pub fn timeout_at(&self) -> Instant {
        self.timeout_at
    }

    pub fn send_confirmation_at(&self) -> Instant {
        self.send_confirmation_at
    }
}
