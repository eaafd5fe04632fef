//! Two-tier key cache.
//!
//! [`DiskCache`] is a fail-open blob store for encrypted entries;
//! [`CacheWrapper`] layers an in-process buffer, a staleness window and
//! [`Key`](crate::Key) (de)serialization on top of any [`BlobCache`].

mod disk;
mod flight;
mod wrapper;

pub use disk::DiskCache;
pub use wrapper::{CacheItem, CacheWrapper, Lookup};

use crate::error::{KeyServiceError, KeyServiceResult};

/// Opaque blob cache keyed by id.
///
/// Implementations are best effort: `load` reports any miss as
/// [`KeyServiceError::NotFound`], and callers treat every failure as a miss.
pub trait BlobCache: Send + Sync {
    fn load(&self, id: &str) -> KeyServiceResult<Vec<u8>>;

    fn store(&self, id: &str, data: &[u8]) -> KeyServiceResult<()>;
}

/// A cache that never holds anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCache;

impl BlobCache for NoCache {
    fn load(&self, _id: &str) -> KeyServiceResult<Vec<u8>> {
        Err(KeyServiceError::NotFound)
    }

    fn store(&self, _id: &str, _data: &[u8]) -> KeyServiceResult<()> {
        Ok(())
    }
}
