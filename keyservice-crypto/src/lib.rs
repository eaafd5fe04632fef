//! Symmetric encryption layer for keyservice.
//!
//! Provides the confidentiality building block used everywhere else:
//! - SHA-1 based derivation of a 128-bit key from an arbitrary passphrase
//! - AES-128-CBC with a random IV and PKCS#7 padding
//! - A passphrase-bound [`KeyedCipher`] for callers that reuse one secret
//!
//! # Wire form
//!
//! Every ciphertext produced here is `IV (16 bytes) || CBC blocks`. The same
//! framing is used for the key-store file, the on-disk cache entries and the
//! body of signed payloads.
//!
//! There is no integrity check at this layer. A wrong key or a flipped byte
//! usually surfaces as [`CryptoError::InvalidPadding`], but may also yield
//! garbage plaintext. Callers that need authenticity sign the output.

mod cipher;
mod error;
mod keyed;

pub use cipher::{BLOCK_SIZE, KEY_SIZE, decrypt, derive_key, encrypt};
pub use error::{CryptoError, CryptoResult};
pub use keyed::KeyedCipher;
