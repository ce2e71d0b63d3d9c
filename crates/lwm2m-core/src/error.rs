//! Error types for the lwm2m-core crate.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("token too long: at most {max} bytes, got {actual}")]
    TokenTooLong { max: usize, actual: usize },
}

/// The random source could not produce bytes.
#[derive(Debug, thiserror::Error)]
#[error("random source failed: {0}")]
pub struct RngError(#[from] pub rand::Error);
