//! Passphrase-bound cipher.

use crate::cipher::{KEY_SIZE, decrypt_with_key, derive_key, encrypt_with_key};
use crate::error::CryptoResult;
use std::fmt;
use zeroize::Zeroizing;

/// A cipher bound to one passphrase.
///
/// The key derivation runs once at construction; every call afterwards goes
/// straight to AES-128-CBC. Output is interchangeable with
/// [`encrypt`](crate::encrypt) / [`decrypt`](crate::decrypt) under the same
/// passphrase.
#[derive(Clone)]
pub struct KeyedCipher {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl KeyedCipher {
    pub fn new(passphrase: impl AsRef<[u8]>) -> Self {
        Self {
            key: derive_key(passphrase.as_ref()),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        encrypt_with_key(plaintext, &self.key)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        decrypt_with_key(ciphertext, &self.key)
    }
}

impl fmt::Debug for KeyedCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCipher").finish_non_exhaustive()
    }
}
