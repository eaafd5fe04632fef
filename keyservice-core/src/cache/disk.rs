//! Fail-open encrypted-blob cache on a local filesystem.

use super::BlobCache;
use super::flight::FlightGroup;
use crate::config::KeyServiceConfig;
use crate::error::{KeyServiceError, KeyServiceResult};
use md5::{Digest, Md5};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Memory-backed location preferred for cache files.
const SHM_DIR: &str = "/dev/shm";

/// Blob cache that stores one file per id.
///
/// The directory is chosen once at construction. If no candidate is
/// writable the cache is disabled: every load misses and every store is a
/// successful no-op.
pub struct DiskCache {
    dir: Option<PathBuf>,
    namespace: String,
    reads: FlightGroup<Result<Vec<u8>, ReadFailure>>,
    writes: FlightGroup<Result<(), String>>,
}

#[derive(Clone)]
enum ReadFailure {
    Missing,
    Io(String),
}

impl DiskCache {
    /// Probes the default locations with the default namespace.
    pub fn new() -> Self {
        Self::from_config(&KeyServiceConfig::default())
    }

    pub fn from_config(config: &KeyServiceConfig) -> Self {
        let candidates = match &config.cache_dir {
            Some(dir) => vec![dir.clone()],
            None => vec![PathBuf::from(SHM_DIR), std::env::temp_dir()],
        };
        let dir = select_cache_dir(&candidates, &config.cache_namespace);
        match &dir {
            Some(dir) => info!("disk cache enabled at {}", dir.display()),
            None => error!("no writable disk cache directory, cache disabled"),
        }
        Self::with_dir(dir, &config.cache_namespace)
    }

    /// A cache that always misses.
    pub fn disabled() -> Self {
        Self::with_dir(None, &KeyServiceConfig::default().cache_namespace)
    }

    fn with_dir(dir: Option<PathBuf>, namespace: &str) -> Self {
        Self {
            dir,
            namespace: namespace.to_string(),
            reads: FlightGroup::new(),
            writes: FlightGroup::new(),
        }
    }

    /// The selected cache directory, `None` when disabled.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Filename for `id`: hex MD5 of the namespaced id.
    pub fn file_name(&self, id: &str) -> String {
        hex::encode(Md5::digest(format!("{}.{id}", self.namespace)))
    }
}

impl Default for DiskCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobCache for DiskCache {
    fn load(&self, id: &str) -> KeyServiceResult<Vec<u8>> {
        let Some(dir) = &self.dir else {
            return Err(KeyServiceError::NotFound);
        };
        let path = dir.join(self.file_name(id));

        self.reads
            .run(id, || match fs::read(&path) {
                Ok(data) => Ok(data),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ReadFailure::Missing),
                Err(e) => Err(ReadFailure::Io(e.to_string())),
            })
            .map_err(|failure| match failure {
                ReadFailure::Missing => KeyServiceError::NotFound,
                ReadFailure::Io(msg) => KeyServiceError::Cache(msg),
            })
    }

    fn store(&self, id: &str, data: &[u8]) -> KeyServiceResult<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let path = dir.join(self.file_name(id));

        self.writes
            .run(id, || {
                write_private(dir, &path, data).map_err(|e| e.to_string())
            })
            .map_err(KeyServiceError::Cache)?;
        debug!("wrote disk cache entry {}", path.display());
        Ok(())
    }
}

/// Replaces `path` atomically with an owner-only file holding `data`.
fn write_private(dir: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(data)?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Picks the first candidate that is actually writable and hosts a
/// writable per-user subdirectory.
fn select_cache_dir(candidates: &[PathBuf], namespace: &str) -> Option<PathBuf> {
    candidates.iter().find_map(|base| {
        let owner = probe_writable(base)?;
        let dir = base.join(format!("{namespace}_{owner}"));
        if dir.is_dir() {
            probe_writable(&dir)?;
        } else if let Err(e) = create_private_dir(&dir) {
            debug!("cannot create cache dir {}: {e}", dir.display());
            return None;
        }
        Some(dir)
    })
}

/// Creates and immediately removes a file in `dir`.
///
/// Returns a tag identifying the file owner, used to keep users' caches
/// apart in shared directories.
fn probe_writable(dir: &Path) -> Option<String> {
    let probe = tempfile::Builder::new()
        .prefix(".probe-")
        .tempfile_in(dir)
        .ok()?;
    let metadata = probe.as_file().metadata().ok()?;
    Some(owner_tag(&metadata))
}

#[cfg(unix)]
fn owner_tag(metadata: &fs::Metadata) -> String {
    use std::os::unix::fs::MetadataExt;
    metadata.uid().to_string()
}

#[cfg(not(unix))]
fn owner_tag(_metadata: &fs::Metadata) -> String {
    "user".to_string()
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}
