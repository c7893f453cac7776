//! Artifact cache.
//!
//! Raw remote artifacts (item metadata JSON, OCR text, thumbnails) are kept
//! under a cache root so that a harvest can be re-run without touching the
//! network for anything it has already seen. The medium is abstracted by
//! [`ArtifactStore`]; [`ArtifactCache`] layers single-flight fetching on top.
//!
//! # Layout
//!
//! ```text
//! <root>/details/<id>.json
//! <root>/fulltext/<id>.txt
//! <root>/images/<id>.gif
//! ```
//!
//! Presence is the only hit signal. Artifacts are written once and never
//! refreshed or validated.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ArtifactError, CacheError, HttpError};

/// The kind of raw artifact stored for an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Metadata,
    FullText,
    Image,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Metadata,
        ArtifactKind::FullText,
        ArtifactKind::Image,
    ];

    /// Subdirectory under the cache root.
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Metadata => "details",
            ArtifactKind::FullText => "fulltext",
            ArtifactKind::Image => "images",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Metadata => "json",
            ArtifactKind::FullText => "txt",
            ArtifactKind::Image => "gif",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactKind::Metadata => "metadata",
            ArtifactKind::FullText => "fulltext",
            ArtifactKind::Image => "image",
        };
        f.write_str(s)
    }
}

/// Key-value storage for raw artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Returns the stored bytes, or `None` when the artifact was never stored.
    async fn get(&self, kind: ArtifactKind, id: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores bytes for `(kind, id)`. Existing artifacts are left untouched.
    async fn put(&self, kind: ArtifactKind, id: &str, bytes: &[u8]) -> Result<(), CacheError>;

    async fn contains(&self, kind: ArtifactKind, id: &str) -> Result<bool, CacheError> {
        Ok(self.get(kind, id).await?.is_some())
    }
}

fn validate_id(id: &str) -> Result<(), CacheError> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0']);
    if bad {
        return Err(CacheError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}

// ============ Filesystem store ============

/// Filesystem-backed [`ArtifactStore`] using the layout described above.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the artifact file for `(kind, id)`.
    pub fn path_for(&self, kind: ArtifactKind, id: &str) -> Result<PathBuf, CacheError> {
        validate_id(id)?;
        Ok(self
            .root
            .join(kind.dir_name())
            .join(format!("{}.{}", id, kind.extension())))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn get(&self, kind: ArtifactKind, id: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(kind, id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Io {
                kind,
                id: id.to_string(),
                source,
            }),
        }
    }

    async fn put(&self, kind: ArtifactKind, id: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(kind, id)?;
        let io_err = |source| CacheError::Io {
            kind,
            id: id.to_string(),
            source,
        };

        if tokio::fs::try_exists(&path).await.map_err(io_err)? {
            return Ok(());
        }

        let dir = self.root.join(kind.dir_name());
        tokio::fs::create_dir_all(&dir).await.map_err(io_err)?;

        // Write-then-rename so an interrupted write never looks like a hit.
        let tmp = dir.join(format!(".{}.{}.tmp", id, uuid::Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }
        Ok(())
    }

    async fn contains(&self, kind: ArtifactKind, id: &str) -> Result<bool, CacheError> {
        let path = self.path_for(kind, id)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| CacheError::Io {
                kind,
                id: id.to_string(),
                source,
            })
    }
}

// ============ In-memory store ============

/// In-memory [`ArtifactStore`], mainly for tests.
#[derive(Default)]
pub struct MemoryArtifactStore {
    entries: RwLock<HashMap<(ArtifactKind, String), Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn get(&self, kind: ArtifactKind, id: &str) -> Result<Option<Vec<u8>>, CacheError> {
        validate_id(id)?;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(&(kind, id.to_string())).cloned())
    }

    async fn put(&self, kind: ArtifactKind, id: &str, bytes: &[u8]) -> Result<(), CacheError> {
        validate_id(id)?;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry((kind, id.to_string()))
            .or_insert_with(|| bytes.to_vec());
        Ok(())
    }
}

// ============ Single-flight cache ============

/// Where the bytes returned by [`ArtifactCache::get_or_fetch`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(Vec<u8>),
    Fetched(Vec<u8>),
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Lookup::Hit(b) | Lookup::Fetched(b) => b,
        }
    }
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Cache-then-fetch over an [`ArtifactStore`].
///
/// Each `(kind, id)` is guarded by its own async lock, so concurrent
/// lookups of the same cold key perform a single remote fetch while
/// distinct keys proceed in parallel.
pub struct ArtifactCache {
    store: Arc<dyn ArtifactStore>,
    locks: Mutex<HashMap<(ArtifactKind, String), KeyLock>>,
}

impl ArtifactCache {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached artifact, or runs `fetch` once and stores its result.
    ///
    /// A failed `put` is logged and the fetched bytes are still returned; the
    /// next run simply misses again.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        kind: ArtifactKind,
        id: &str,
        fetch: F,
    ) -> Result<Lookup, ArtifactError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, HttpError>>,
    {
        validate_id(id)?;
        let lease = self.lease((kind, id.to_string()));
        let _guard = lease.lock.lock().await;
        self.lookup_locked(kind, id, fetch).await
    }

    async fn lookup_locked<F, Fut>(
        &self,
        kind: ArtifactKind,
        id: &str,
        fetch: F,
    ) -> Result<Lookup, ArtifactError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, HttpError>>,
    {
        if let Some(bytes) = self.store.get(kind, id).await? {
            debug!(%kind, id, "cache hit");
            return Ok(Lookup::Hit(bytes));
        }

        let bytes = fetch().await?;
        if let Err(e) = self.store.put(kind, id, &bytes).await {
            warn!(%kind, id, error = %e, "failed to persist artifact; using in-memory copy");
        }
        Ok(Lookup::Fetched(bytes))
    }

    fn lease(&self, key: (ArtifactKind, String)) -> KeyLease<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = locks.entry(key.clone()).or_default().clone();
        KeyLease {
            cache: self,
            key,
            lock,
        }
    }
}

/// A reference to one key's lock; dropping it, including when the lookup
/// future is cancelled, removes the map entry once nobody else holds it.
struct KeyLease<'a> {
    cache: &'a ArtifactCache,
    key: (ArtifactKind, String),
    lock: KeyLock,
}

impl Drop for KeyLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.cache.locks.lock().unwrap_or_else(|e| e.into_inner());
        let ours = locks
            .get(&self.key)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock));
        // One reference in the map plus ours means nobody else is waiting.
        if ours && Arc::strong_count(&self.lock) <= 2 {
            locks.remove(&self.key);
        }
    }
}
