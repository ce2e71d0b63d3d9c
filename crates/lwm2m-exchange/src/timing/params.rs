use std::time::Duration;

use super::constants::*;
use crate::error::ExchangeError;

/// Transmission parameters of a CoAP endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxParams {
    pub ack_timeout: Duration,
    pub ack_random_factor: f64,
    pub max_retransmit: u16,
}

impl TxParams {
    /// Build parameters, rejecting values the retransmission logic cannot use.
    pub fn new(
        ack_timeout: Duration,
        ack_random_factor: f64,
        max_retransmit: u16,
    ) -> Result<Self, ExchangeError> {
        let params = Self {
            ack_timeout,
            ack_random_factor,
            max_retransmit,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ExchangeError> {
        if !(self.ack_random_factor.is_finite() && self.ack_random_factor >= 1.0) {
            return Err(ExchangeError::InvalidRandomFactor(self.ack_random_factor));
        }
        if self.ack_timeout < MIN_ACK_TIMEOUT {
            return Err(ExchangeError::InvalidAckTimeout {
                min: MIN_ACK_TIMEOUT,
                actual: self.ack_timeout,
            });
        }
        Ok(())
    }
}

impl Default for TxParams {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            ack_random_factor: DEFAULT_ACK_RANDOM_FACTOR,
            max_retransmit: DEFAULT_MAX_RETRANSMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TxParams::default().validate().is_ok());
    }

    #[test]
    fn rejects_factor_below_one() {
        let err = TxParams::new(DEFAULT_ACK_TIMEOUT, 0.9, 4).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidRandomFactor(_)));
        assert!(TxParams::new(DEFAULT_ACK_TIMEOUT, f64::NAN, 4).is_err());
        assert!(TxParams::new(DEFAULT_ACK_TIMEOUT, f64::INFINITY, 4).is_err());
    }

    #[test]
    fn rejects_short_ack_timeout() {
        let err = TxParams::new(Duration::from_millis(999), 1.5, 4).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidAckTimeout { .. }));
        assert!(TxParams::new(Duration::from_millis(1000), 1.0, 0).is_ok());
    }
}
