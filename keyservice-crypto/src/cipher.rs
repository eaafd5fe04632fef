//! AES-128-CBC primitive with random IV and PKCS#7 padding.

use crate::error::{CryptoError, CryptoResult};
use aes::Aes128;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

/// AES block size in bytes (also the IV size).
pub const BLOCK_SIZE: usize = 16;

/// Derived key size in bytes (AES-128).
pub const KEY_SIZE: usize = 16;

type Encryptor = cbc::Encryptor<Aes128>;
type Decryptor = cbc::Decryptor<Aes128>;

/// Derives the AES-128 key for a raw passphrase: the first 16 bytes of
/// `SHA-1(raw_key)`.
pub fn derive_key(raw_key: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let digest = Sha1::digest(raw_key);
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&digest[..KEY_SIZE]);
    key
}

/// Encrypts `plaintext` under `raw_key`, returning `IV || ciphertext`.
///
/// Fails only when the OS random source cannot produce an IV.
pub fn encrypt(plaintext: &[u8], raw_key: &[u8]) -> CryptoResult<Vec<u8>> {
    encrypt_with_key(plaintext, &derive_key(raw_key))
}

/// Decrypts `IV || ciphertext` produced by [`encrypt`] under `raw_key`.
pub fn decrypt(ciphertext: &[u8], raw_key: &[u8]) -> CryptoResult<Vec<u8>> {
    // Framing is checked before paying for the key derivation.
    split_frame(ciphertext)?;
    decrypt_with_key(ciphertext, &derive_key(raw_key))
}

pub(crate) fn encrypt_with_key(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> CryptoResult<Vec<u8>> {
    let mut iv = [0u8; BLOCK_SIZE];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| CryptoError::RandomSource(e.to_string()))?;

    let body = Encryptor::new_from_slices(key, &iv)
        .map_err(|_| invalid_key_length(key.len()))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(BLOCK_SIZE + body.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&body);
    Ok(out)
}

pub(crate) fn decrypt_with_key(ciphertext: &[u8], key: &[u8; KEY_SIZE]) -> CryptoResult<Vec<u8>> {
    let (iv, body) = split_frame(ciphertext)?;

    let mut plaintext = Decryptor::new_from_slices(key, iv)
        .map_err(|_| invalid_key_length(key.len()))?
        .decrypt_padded_vec_mut::<NoPadding>(body)
        .map_err(|_| CryptoError::BlockAlignment)?;

    let len = unpadded_len(&plaintext)?;
    plaintext.truncate(len);
    Ok(plaintext)
}

fn split_frame(ciphertext: &[u8]) -> CryptoResult<(&[u8], &[u8])> {
    if ciphertext.len() < BLOCK_SIZE {
        return Err(CryptoError::InputTooShort {
            len: ciphertext.len(),
        });
    }
    let (iv, body) = ciphertext.split_at(BLOCK_SIZE);
    if body.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::BlockAlignment);
    }
    Ok((iv, body))
}

/// Length of `data` once its trailing pad is stripped.
///
/// Only the last byte is inspected: a pad value larger than the buffer is
/// rejected, anything else is trusted.
fn unpadded_len(data: &[u8]) -> CryptoResult<usize> {
    let Some(&last) = data.last() else {
        return Err(CryptoError::InvalidPadding);
    };
    let pad = usize::from(last);
    if pad > data.len() {
        return Err(CryptoError::InvalidPadding);
    }
    Ok(data.len() - pad)
}

fn invalid_key_length(actual: usize) -> CryptoError {
    CryptoError::InvalidKeyLength {
        expected: KEY_SIZE,
        actual,
    }
}
