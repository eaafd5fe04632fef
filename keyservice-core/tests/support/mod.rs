//! Shared test doubles and fixtures.
#![allow(dead_code)]

use keyservice_core::storage::keystore::{encode_keystore, write_keystore};
use keyservice_core::{BlobCache, Key, KeyServiceError, KeyServiceResult, KeyStorage};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

pub const KEY_ID_1: &str = "test-key-1";
pub const KEY_ID_2: &str = "test-key-2";

pub fn test_key_1() -> Key {
    Key::new(1, "test-key-1-value")
}

pub fn test_key_2() -> Key {
    Key::with_previous(2, "test-key-2-value-new", "test-key-2-value")
}

/// In-memory storage that counts lookups per id and per call.
#[derive(Default)]
pub struct CountingStorage {
    data: Mutex<HashMap<String, Key>>,
    load_stat: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl CountingStorage {
    pub fn with_test_keys() -> Self {
        let storage = Self::default();
        storage.set(KEY_ID_1, test_key_1());
        storage.set(KEY_ID_2, test_key_2());
        storage
    }

    pub fn set(&self, id: &str, key: Key) {
        self.data.lock().unwrap().insert(id.to_string(), key);
    }

    pub fn loads(&self, id: &str) -> usize {
        self.load_stat.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes the next `load_many` fail after counting its ids.
    pub fn fail_next_load(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl KeyStorage for CountingStorage {
    fn store(&self, id: &str, key: &Key) -> KeyServiceResult<()> {
        self.set(id, key.clone());
        Ok(())
    }

    fn load_many(&self, ids: &[String]) -> KeyServiceResult<HashMap<String, Key>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let data = self.data.lock().unwrap();
        let mut stat = self.load_stat.lock().unwrap();
        let mut found = HashMap::new();
        for id in ids {
            *stat.entry(id.clone()).or_default() += 1;
            if let Some(key) = data.get(id) {
                found.insert(id.clone(), key.clone());
            }
        }

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(KeyServiceError::Cache("load_many error caused by test flag".into()));
        }
        Ok(found)
    }
}

/// In-memory blob cache that counts loads, hits and stores per id.
#[derive(Default)]
pub struct CountingCache {
    data: Mutex<HashMap<String, Vec<u8>>>,
    load_stat: Mutex<HashMap<String, usize>>,
    hit_stat: Mutex<HashMap<String, usize>>,
    store_stat: Mutex<HashMap<String, usize>>,
}

impl CountingCache {
    pub fn loads(&self, id: &str) -> usize {
        count(&self.load_stat, id)
    }

    pub fn hits(&self, id: &str) -> usize {
        count(&self.hit_stat, id)
    }

    pub fn stores(&self, id: &str) -> usize {
        count(&self.store_stat, id)
    }

    pub fn raw(&self, id: &str) -> Option<Vec<u8>> {
        self.data.lock().unwrap().get(id).cloned()
    }

    pub fn put_raw(&self, id: &str, data: Vec<u8>) {
        self.data.lock().unwrap().insert(id.to_string(), data);
    }
}

impl BlobCache for CountingCache {
    fn load(&self, id: &str) -> KeyServiceResult<Vec<u8>> {
        bump(&self.load_stat, id);
        let data = self.data.lock().unwrap().get(id).cloned();
        match data {
            Some(data) => {
                bump(&self.hit_stat, id);
                Ok(data)
            }
            None => Err(KeyServiceError::NotFound),
        }
    }

    fn store(&self, id: &str, data: &[u8]) -> KeyServiceResult<()> {
        bump(&self.store_stat, id);
        self.put_raw(id, data.to_vec());
        Ok(())
    }
}

/// A blob cache whose every operation fails with an I/O error.
pub struct BrokenCache;

impl BlobCache for BrokenCache {
    fn load(&self, _id: &str) -> KeyServiceResult<Vec<u8>> {
        Err(KeyServiceError::Cache("disk on fire".into()))
    }

    fn store(&self, _id: &str, _data: &[u8]) -> KeyServiceResult<()> {
        Err(KeyServiceError::Cache("disk on fire".into()))
    }
}

fn bump(stat: &Mutex<HashMap<String, usize>>, id: &str) {
    *stat.lock().unwrap().entry(id.to_string()).or_default() += 1;
}

fn count(stat: &Mutex<HashMap<String, usize>>, id: &str) -> usize {
    stat.lock().unwrap().get(id).copied().unwrap_or(0)
}

/// Seals `keys` into a key-store file at `path`.
pub fn write_keys(path: &Path, keys: &HashMap<String, Key>, secret: &str) {
    let contents = encode_keystore(keys, secret.as_bytes()).unwrap();
    write_keystore(path, &contents).unwrap();
}

/// Moves the file's modification time forward so a reload is observed even
/// on filesystems with coarse timestamps.
pub fn bump_mtime(path: &Path, secs: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs))
        .unwrap();
}
