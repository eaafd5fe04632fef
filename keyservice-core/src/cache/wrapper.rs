//! Encrypted, time-bounded key cache.

use super::BlobCache;
use crate::error::{KeyServiceError, KeyServiceResult};
use crate::key::Key;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use keyservice_crypto::KeyedCipher;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// A cached key with its freshness deadline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheItem {
    #[serde(rename = "v")]
    pub value: Key,
    #[serde(rename = "e")]
    pub expiration: DateTime<Utc>,
}

impl CacheItem {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expiration
    }
}

/// Outcome of a cache hit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Fresh(Key),
    /// The staleness window has passed; the key is still usable while a
    /// refresh is attempted.
    Stale(Key),
}

impl Lookup {
    fn from_item(item: &CacheItem) -> Self {
        if item.is_expired() {
            Self::Stale(item.value.clone())
        } else {
            Self::Fresh(item.value.clone())
        }
    }

    pub fn key(&self) -> &Key {
        match self {
            Self::Fresh(key) | Self::Stale(key) => key,
        }
    }

    pub fn into_key(self) -> Key {
        match self {
            Self::Fresh(key) | Self::Stale(key) => key,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }

    /// The key if fresh, [`KeyServiceError::Expired`] otherwise.
    pub fn fresh(self) -> KeyServiceResult<Key> {
        match self {
            Self::Fresh(key) => Ok(key),
            Self::Stale(_) => Err(KeyServiceError::Expired),
        }
    }
}

/// Process-local buffer in front of an encrypted [`BlobCache`].
///
/// Entries are sealed with the seed-keyed cipher before they reach the blob
/// cache, so nothing readable lands on disk. Stores always win: they replace
/// the buffered entry immediately, before the write-through is attempted.
pub struct CacheWrapper {
    cache: Arc<dyn BlobCache>,
    cipher: KeyedCipher,
    ttl: TimeDelta,
    buffer: DashMap<String, CacheItem>,
}

impl CacheWrapper {
    pub fn new(cache: Arc<dyn BlobCache>, cipher: KeyedCipher, ttl: Duration) -> Self {
        Self {
            cache,
            cipher,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            buffer: DashMap::new(),
        }
    }

    /// Looks up `id`, consulting the blob cache on a buffer miss.
    ///
    /// Any blob cache failure, decryption failure or unreadable entry is
    /// reported as [`KeyServiceError::NotFound`].
    pub fn load(&self, id: &str) -> KeyServiceResult<Lookup> {
        if let Some(item) = self.buffer.get(id) {
            return Ok(Lookup::from_item(&item));
        }

        let item = self.load_persisted(id).ok_or(KeyServiceError::NotFound)?;
        debug!("loaded cache entry {id}");

        // A store that raced this load holds the newer value.
        let item = self.buffer.entry(id.to_string()).or_insert(item);
        Ok(Lookup::from_item(&item))
    }

    /// Caches `key` for one staleness window.
    ///
    /// The buffer is updated first; persistence failures are logged.
    pub fn store(&self, id: &str, key: Key) {
        let item = self.remember(id, key);
        self.persist(id, &item);
    }

    /// Updates the buffer only, returning the item to persist.
    pub(crate) fn remember(&self, id: &str, key: Key) -> CacheItem {
        let expiration = Utc::now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let item = CacheItem {
            value: key,
            expiration,
        };
        self.buffer.insert(id.to_string(), item.clone());
        debug!("stored cache entry {id}");
        item
    }

    /// Seals `item` and writes it through to the blob cache.
    pub(crate) fn persist(&self, id: &str, item: &CacheItem) {
        if let Err(e) = self.seal(item).and_then(|data| self.cache.store(id, &data)) {
            error!("cache store {id} failed: {e}");
        }
    }

    /// Drops every buffered entry; persisted entries are untouched.
    pub fn clear_buffer(&self) {
        self.buffer.clear();
    }

    fn seal(&self, item: &CacheItem) -> KeyServiceResult<Vec<u8>> {
        let json = serde_json::to_vec(item)?;
        Ok(self.cipher.encrypt(&json)?)
    }

    fn load_persisted(&self, id: &str) -> Option<CacheItem> {
        let data = match self.cache.load(id) {
            Ok(data) if !data.is_empty() => data,
            Ok(_) | Err(KeyServiceError::NotFound) => return None,
            Err(e) => {
                warn!("cache load {id} failed: {e}");
                return None;
            }
        };

        let json = match self.cipher.decrypt(&data) {
            Ok(json) => json,
            Err(e) => {
                error!("cache entry {id} decrypt failed: {e}");
                return None;
            }
        };

        match serde_json::from_slice(&json) {
            Ok(item) => Some(item),
            Err(e) => {
                error!("cache entry {id} unmarshal failed: {e}");
                None
            }
        }
    }
}
