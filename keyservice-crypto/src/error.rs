//! Cipher-layer error types.

use thiserror::Error;

/// Result type for cipher operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by the symmetric primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("ciphertext too short: {len} bytes, need at least one block")]
    InputTooShort { len: usize },

    #[error("ciphertext is not a whole number of blocks")]
    BlockAlignment,

    #[error("invalid padding")]
    InvalidPadding,

    #[error("random source unavailable: {0}")]
    RandomSource(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}
