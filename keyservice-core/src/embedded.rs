//! Decryption of payloads embedded in free text, e.g. configuration files.
//!
//! An embedded payload is wrapped in `$$` delimiters:
//! `{"password": "$$<payload>$$"}`.

use crate::error::KeyServiceResult;
use crate::service::KeyService;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Payloads are base64url, so only the ASCII alphabet can appear inside.
static EMBEDDED_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$([A-Za-z0-9_-]+)\$\$").expect("embedded payload pattern is valid")
});

impl KeyService {
    /// Replaces every `$$payload$$` token in `content` with its plaintext.
    ///
    /// Each distinct token is decrypted once and substituted at every
    /// position it occurs. The first token that fails to decrypt aborts the
    /// whole substitution with that error.
    pub fn decrypt_embedded_string(&self, content: &str, key_id: &str) -> KeyServiceResult<String> {
        let mut seen = HashSet::new();
        let mut result = content.to_string();

        for captures in EMBEDDED_PAYLOAD.captures_iter(content) {
            let (token, [payload]) = captures.extract();
            if !seen.insert(token) {
                continue;
            }
            let plaintext = self.decrypt(payload, key_id)?;
            result = result.replace(token, &plaintext);
        }

        Ok(result)
    }
}
