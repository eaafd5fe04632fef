//! Key resolution and signed ciphertext exchange for internal services.
//!
//! Callers ask a [`KeyService`] to encrypt or decrypt short payloads under a
//! key id; they never see raw key material. Keys are resolved through two
//! tiers:
//! - an in-process buffer with a staleness window, backed by an encrypted
//!   on-disk blob cache ([`CacheWrapper`] over [`DiskCache`])
//! - the single encrypted key-store file, hot-reloaded when its modification
//!   time advances ([`FileKeyStore`])
//!
//! # Payload format
//!
//! `base64url(signature[4] || version[2, BE] || IV[16] || AES-128-CBC body)`.
//! The signature is the centre 4 bytes of `MD5(version || IV || body || seed)`
//! where `seed` is the per-deployment seed key, which is never transmitted.
//!
//! # Rotation
//!
//! Rotating a key bumps its version and moves the old secret into the
//! "will expire" slot. Payloads sealed under the previous version keep
//! decrypting until the operator clears that slot.

pub mod cache;
pub mod config;
mod embedded;
pub mod error;
pub mod key;
pub mod service;
pub mod storage;

pub use cache::{BlobCache, CacheItem, CacheWrapper, DiskCache, Lookup, NoCache};
pub use config::KeyServiceConfig;
pub use error::{KeyServiceError, KeyServiceResult};
pub use key::Key;
pub use service::KeyService;
pub use storage::{FileKeyStore, KeyStorage};
