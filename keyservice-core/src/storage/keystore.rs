//! Key-store file format.
//!
//! A key-store file is `base64url-no-pad(IV || AES-128-CBC(json))`, where
//! the JSON object maps key id to `{"n": version, "v": value, "o": previous}`
//! and the AES key is derived from the operator secret.

use crate::error::KeyServiceResult;
use crate::key::Key;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Decodes key-store file contents. Surrounding whitespace is ignored.
pub fn decode_keystore(contents: &str, secret: &[u8]) -> KeyServiceResult<HashMap<String, Key>> {
    let sealed = URL_SAFE_NO_PAD.decode(contents.trim())?;
    let json = keyservice_crypto::decrypt(&sealed, secret)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Encodes a key map as key-store file contents.
pub fn encode_keystore(keys: &HashMap<String, Key>, secret: &[u8]) -> KeyServiceResult<String> {
    let json = serde_json::to_vec(keys)?;
    seal_keystore(&json, secret)
}

/// Seals raw key-map JSON without re-serializing it.
pub fn seal_keystore(json: &[u8], secret: &[u8]) -> KeyServiceResult<String> {
    let sealed = keyservice_crypto::encrypt(json, secret)?;
    Ok(URL_SAFE_NO_PAD.encode(sealed))
}

/// Writes `contents` to `path`, replacing any existing file atomically.
///
/// A concurrently reloading [`FileKeyStore`](super::FileKeyStore) sees
/// either the old file or the new one, never a partial write.
pub fn write_keystore(path: &Path, contents: &str) -> KeyServiceResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
