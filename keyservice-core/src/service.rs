//! Key resolution and the signed payload protocol.

use crate::cache::{BlobCache, CacheWrapper, Lookup};
use crate::config::KeyServiceConfig;
use crate::error::{KeyServiceError, KeyServiceResult};
use crate::key::Key;
use crate::storage::KeyStorage;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use keyservice_crypto::KeyedCipher;
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};
use zeroize::Zeroizing;

/// Bytes of truncated MD5 carried in front of every payload.
pub const SIGNATURE_SIZE: usize = 4;

/// Bytes of big-endian key version following the signature.
pub const VERSION_SIZE: usize = 2;

/// Encrypts and decrypts payloads under named, versioned keys.
///
/// Keys are resolved through the cache first and fall through to storage
/// for anything missing or stale. Storage and cache faults never fail a
/// lookup on their own; whatever could be resolved is returned.
pub struct KeyService {
    seed_key: Zeroizing<Vec<u8>>,
    storage: Arc<dyn KeyStorage>,
    cache: Arc<CacheWrapper>,
    warm_in_background: bool,
}

impl KeyService {
    /// Creates a service with the default configuration.
    ///
    /// `seed_key` is the per-deployment secret: it seals cache entries and
    /// is mixed into every payload signature.
    pub fn new(
        seed_key: impl AsRef<[u8]>,
        storage: Arc<dyn KeyStorage>,
        cache: Arc<dyn BlobCache>,
    ) -> Self {
        Self::with_config(seed_key, storage, cache, &KeyServiceConfig::default())
    }

    pub fn with_config(
        seed_key: impl AsRef<[u8]>,
        storage: Arc<dyn KeyStorage>,
        cache: Arc<dyn BlobCache>,
        config: &KeyServiceConfig,
    ) -> Self {
        let seed_key = Zeroizing::new(seed_key.as_ref().to_vec());
        let cipher = KeyedCipher::new(seed_key.as_slice());
        Self {
            cache: Arc::new(CacheWrapper::new(cache, cipher, config.cache_ttl())),
            seed_key,
            storage,
            warm_in_background: config.warm_cache_in_background,
        }
    }

    /// Resolves a batch of key ids.
    ///
    /// Cache hits, fresh or stale, are used immediately. Everything missing
    /// or stale is refreshed with a single storage call, and refreshed keys
    /// are written back to the cache. A failed storage call is logged and
    /// the cached (possibly stale) keys are returned as they are.
    pub fn get_keys<S: AsRef<str>>(&self, ids: &[S]) -> KeyServiceResult<HashMap<String, Key>> {
        let mut keys = HashMap::with_capacity(ids.len());
        let mut refresh = Vec::new();

        for id in ids {
            let id = id.as_ref();
            match self.cache.load(id) {
                Ok(Lookup::Fresh(key)) => {
                    keys.insert(id.to_string(), key);
                }
                Ok(Lookup::Stale(key)) => {
                    keys.insert(id.to_string(), key);
                    refresh.push(id.to_string());
                }
                Err(_) => refresh.push(id.to_string()),
            }
        }

        if refresh.is_empty() {
            return Ok(keys);
        }

        debug!("load keys={} from storage", refresh.join(","));
        match self.storage.load_many(&refresh) {
            Ok(loaded) => {
                for (id, key) in loaded {
                    self.warm(&id, &key);
                    keys.insert(id, key);
                }
            }
            Err(e) => error!("load keys={} from storage err={e}", refresh.join(",")),
        }

        Ok(keys)
    }

    /// Resolves one key id.
    pub fn get_key(&self, id: &str) -> Option<Key> {
        self.get_keys(&[id]).ok()?.remove(id)
    }

    /// Encrypts `plaintext` under the current version of `key_id`.
    pub fn encrypt(&self, plaintext: impl AsRef<[u8]>, key_id: &str) -> KeyServiceResult<String> {
        let key = self.get_key(key_id).ok_or(KeyServiceError::NotFound)?;
        let body = keyservice_crypto::encrypt(plaintext.as_ref(), key.value().as_bytes())?;

        let mut payload = Vec::with_capacity(SIGNATURE_SIZE + VERSION_SIZE + body.len());
        payload.extend_from_slice(&[0u8; SIGNATURE_SIZE]);
        payload.extend_from_slice(&key.version().to_be_bytes());
        payload.extend_from_slice(&body);

        let signature = self.sign(&payload[SIGNATURE_SIZE..]);
        payload[..SIGNATURE_SIZE].copy_from_slice(&signature);

        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    /// Decrypts a payload produced by [`encrypt`](Self::encrypt) and returns
    /// the raw plaintext bytes.
    pub fn decrypt_bytes(&self, content: &str, key_id: &str) -> KeyServiceResult<Vec<u8>> {
        let key = self.get_key(key_id).ok_or(KeyServiceError::NotFound)?;

        let payload = URL_SAFE_NO_PAD
            .decode(content)
            .map_err(|_| KeyServiceError::InvalidEncryptedData)?;
        if payload.len() < SIGNATURE_SIZE + VERSION_SIZE + 1 {
            return Err(KeyServiceError::InvalidEncryptedData);
        }

        let (signature, signed) = payload.split_at(SIGNATURE_SIZE);
        if signature != self.sign(signed) {
            return Err(KeyServiceError::SignatureError);
        }

        let (version, body) = signed.split_at(VERSION_SIZE);
        let version = u16::from_be_bytes([version[0], version[1]]);
        if version != key.version() {
            debug!(
                "payload for {key_id} sealed under version {version}, current is {}",
                key.version()
            );
        }

        Ok(keyservice_crypto::decrypt(body, key.secret_for(version).as_bytes())?)
    }

    /// Decrypts a payload produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, content: &str, key_id: &str) -> KeyServiceResult<String> {
        Ok(String::from_utf8(self.decrypt_bytes(content, key_id)?)?)
    }

    /// Centre slice of `MD5(signed || seed_key)`.
    fn sign(&self, signed: &[u8]) -> [u8; SIGNATURE_SIZE] {
        let digest = Md5::new()
            .chain_update(signed)
            .chain_update(self.seed_key.as_slice())
            .finalize();
        let start = (digest.len() - SIGNATURE_SIZE) / 2;

        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&digest[start..start + SIGNATURE_SIZE]);
        signature
    }

    /// Caches a freshly loaded key. The buffer is updated synchronously;
    /// the sealed write-through may run on a detached thread.
    fn warm(&self, id: &str, key: &Key) {
        let item = self.cache.remember(id, key.clone());
        if !self.warm_in_background {
            self.cache.persist(id, &item);
            return;
        }

        let cache = Arc::clone(&self.cache);
        let owned_id = id.to_string();
        let spawned = thread::Builder::new()
            .name("keyservice-cache-warm".to_string())
            .spawn(move || cache.persist(&owned_id, &item));
        if let Err(e) = spawned {
            warn!("cannot spawn cache writer for {id}: {e}");
        }
    }
}
