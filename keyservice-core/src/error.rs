//! Key service error types.

use keyservice_crypto::CryptoError;
use thiserror::Error;

/// Result type for key service operations.
pub type KeyServiceResult<T> = Result<T, KeyServiceError>;

/// Errors that can occur while resolving keys or exchanging payloads.
#[derive(Debug, Error)]
pub enum KeyServiceError {
    #[error("not found")]
    NotFound,

    /// A cached value exists but its staleness window has passed.
    #[error("expired")]
    Expired,

    #[error("invalid encrypted data")]
    InvalidEncryptedData,

    #[error("signature error")]
    SignatureError,

    #[error("method not implemented")]
    MethodNotImplemented,

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("key store encoding error: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("decrypted payload is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache I/O error: {0}")]
    Cache(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
