//! Hot-reloading key store backed by one encrypted file.

use super::KeyStorage;
use super::keystore::decode_keystore;
use crate::error::{KeyServiceError, KeyServiceResult};
use crate::key::Key;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use tracing::{error, info};
use zeroize::Zeroizing;

/// Key store reading from an encrypted key-store file.
///
/// The file is read once at construction and again whenever a lookup sees
/// its modification time advance. Each reload swaps in a whole new map, so
/// readers never see a half-applied update. A failed reload keeps serving
/// the last good map.
///
/// Keys change only by re-sealing the file; [`KeyStorage::store`] is not
/// supported.
pub struct FileKeyStore {
    path: PathBuf,
    secret: Zeroizing<Vec<u8>>,
    snapshot: RwLock<Snapshot>,
}

struct Snapshot {
    keys: Arc<HashMap<String, Key>>,
    modified: SystemTime,
}

impl FileKeyStore {
    /// Opens and decodes the key-store file. Any failure is returned.
    pub fn open(path: impl AsRef<Path>, secret: impl AsRef<[u8]>) -> KeyServiceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let secret = Zeroizing::new(secret.as_ref().to_vec());
        let snapshot = read_snapshot(&path, &secret)?;
        info!(
            "opened key store {} with {} keys",
            path.display(),
            snapshot.keys.len()
        );

        Ok(Self {
            path,
            secret,
            snapshot: RwLock::new(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of keys in the current snapshot.
    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    /// Reloads the file if it changed since the last successful load.
    ///
    /// Returns whether a new snapshot was installed.
    pub fn refresh(&self) -> KeyServiceResult<bool> {
        if !self.modified() {
            return Ok(false);
        }

        let fresh = read_snapshot(&self.path, &self.secret)?;
        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        // A concurrent reload may already have installed a newer file.
        if fresh.modified < snapshot.modified {
            return Ok(false);
        }
        info!(
            "reloaded key store {} with {} keys",
            self.path.display(),
            fresh.keys.len()
        );
        *snapshot = fresh;
        Ok(true)
    }

    fn modified(&self) -> bool {
        let Ok(mtime) = fs::metadata(&self.path).and_then(|m| m.modified()) else {
            return false;
        };
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .modified
            < mtime
    }

    fn current(&self) -> Arc<HashMap<String, Key>> {
        Arc::clone(
            &self
                .snapshot
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .keys,
        )
    }
}

impl KeyStorage for FileKeyStore {
    fn store(&self, _id: &str, _key: &Key) -> KeyServiceResult<()> {
        Err(KeyServiceError::MethodNotImplemented)
    }

    fn load_many(&self, ids: &[String]) -> KeyServiceResult<HashMap<String, Key>> {
        if let Err(e) = self.refresh() {
            error!("reload key store {} failed: {e}", self.path.display());
        }

        let keys = self.current();
        Ok(ids
            .iter()
            .filter_map(|id| keys.get(id).map(|key| (id.clone(), key.clone())))
            .collect())
    }
}

fn read_snapshot(path: &Path, secret: &[u8]) -> KeyServiceResult<Snapshot> {
    let modified = fs::metadata(path)?.modified()?;
    let contents = fs::read_to_string(path)?;
    let keys = decode_keystore(&contents, secret)?;
    Ok(Snapshot {
        keys: Arc::new(keys),
        modified,
    })
}
