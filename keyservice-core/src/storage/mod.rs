//! Source of truth for key material.

mod file;
pub mod keystore;

pub use file::FileKeyStore;

use crate::error::KeyServiceResult;
use crate::key::Key;
use std::collections::HashMap;

/// Backing store for keys.
pub trait KeyStorage: Send + Sync {
    fn store(&self, id: &str, key: &Key) -> KeyServiceResult<()>;

    /// Resolves a batch of ids in one round trip. Unknown ids are absent
    /// from the result.
    fn load_many(&self, ids: &[String]) -> KeyServiceResult<HashMap<String, Key>>;
}
