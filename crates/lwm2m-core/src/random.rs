//! Random source seam used for tokens, message-id seeding and timeout jitter.

use rand::RngCore;

use crate::error::RngError;
use crate::message::{MAX_TOKEN_LEN, Token};

/// A source of non-cryptographic random bytes that may fail.
///
/// Implemented for every [`rand::RngCore`], so `rand::thread_rng()` and
/// seeded `StdRng`s can be used directly.
pub trait RandomSource {
    fn fill_random(&mut self, dest: &mut [u8]) -> Result<(), RngError>;

    fn random_u16(&mut self) -> Result<u16, RngError> {
        let mut buf = [0u8; 2];
        self.fill_random(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn random_u32(&mut self) -> Result<u32, RngError> {
        let mut buf = [0u8; 4];
        self.fill_random(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// A fresh full-length token.
    fn random_token(&mut self) -> Result<Token, RngError> {
        let mut bytes = [0u8; MAX_TOKEN_LEN];
        self.fill_random(&mut bytes)?;
        Ok(Token::new(bytes))
    }
}

impl<R: RngCore> RandomSource for R {
    fn fill_random(&mut self, dest: &mut [u8]) -> Result<(), RngError> {
        self.try_fill_bytes(dest)?;
        Ok(())
    }
}
