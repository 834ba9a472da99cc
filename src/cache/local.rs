//! Local cache tier: one archive file per key in a directory

use crate::cache::EntryMeta;
use crate::error::{TarmacError, TarmacResult};
use crate::hash::CacheKey;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::debug;

/// Directory-backed cache tier
pub struct LocalCache {
    dir: PathBuf,
    partial_seq: AtomicU64,
}

impl LocalCache {
    /// Create a local tier rooted at `dir` (created lazily)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            partial_seq: AtomicU64::new(0),
        }
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of a key's archive
    pub fn path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Stat the entry; `None` when absent
    pub async fn exists(&self, key: &CacheKey) -> TarmacResult<Option<EntryMeta>> {
        let path = self.path(key);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(EntryMeta { size: meta.len() })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TarmacError::io(format!("inspecting {}", path.display()), e)),
        }
    }

    /// Create the cache directory if needed
    pub async fn ensure_dir(&self) -> TarmacResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| TarmacError::io(format!("creating {}", self.dir.display()), e))
    }

    /// A unique scratch path next to the key's final path.
    ///
    /// Scratch files start with a dot and never collide with a final name.
    pub fn partial_path(&self, key: &CacheKey) -> PathBuf {
        let seq = self.partial_seq.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}.{}.partial",
            key.file_name(),
            std::process::id(),
            seq
        ))
    }

    /// Move a finished scratch file into place.
    ///
    /// Losing a rename race to another writer of the same key is fine: both
    /// wrote the same content.
    pub async fn commit(&self, partial: &Path, key: &CacheKey) -> TarmacResult<EntryMeta> {
        let target = self.path(key);
        if let Err(e) = fs::rename(partial, &target).await {
            discard(partial).await;
            if self.exists(key).await?.is_none() {
                return Err(TarmacError::io(
                    format!("moving cache entry into {}", target.display()),
                    e,
                ));
            }
            debug!("Another writer already stored {}", key);
        }
        self.exists(key)
            .await?
            .ok_or_else(|| TarmacError::Internal(format!("{} vanished after commit", key)))
    }

    /// Run `write` against a fresh scratch path, then commit it.
    ///
    /// The scratch file is removed on every failure path, so a half-written
    /// archive never appears under a final name.
    pub async fn write_atomically<F, Fut>(&self, key: &CacheKey, write: F) -> TarmacResult<EntryMeta>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: std::future::Future<Output = TarmacResult<()>>,
    {
        self.ensure_dir().await?;
        let partial = self.partial_path(key);
        if let Err(e) = write(partial.clone()).await {
            discard(&partial).await;
            return Err(e);
        }
        self.commit(&partial, key).await
    }
}

/// Remove a scratch file, ignoring "already gone"
pub(crate) async fn discard(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!("Could not remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> CacheKey {
        CacheKey::new("@acme/ui", "abc123", "v1")
    }

    #[tokio::test]
    async fn missing_entry_is_none() {
        let dir = TempDir::new().unwrap();
        let local = LocalCache::new(dir.path().join("cache"));
        assert!(local.exists(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_atomically_commits() {
        let dir = TempDir::new().unwrap();
        let local = LocalCache::new(dir.path().join("cache"));

        let meta = local
            .write_atomically(&key(), |path| async move {
                fs::write(&path, b"archive").await.unwrap();
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(meta.size, 7);
        assert_eq!(local.exists(&key()).await.unwrap(), Some(EntryMeta { size: 7 }));
        assert_eq!(local.path(&key()), dir.path().join("cache/acme__ui-abc123-v1.tar"));
    }

    #[tokio::test]
    async fn failed_write_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let local = LocalCache::new(dir.path().join("cache"));

        let err = local
            .write_atomically(&key(), |path| async move {
                fs::write(&path, b"half an arch").await.unwrap();
                Err(TarmacError::transport("acme__ui-abc123-v1", "connection reset"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TarmacError::Transport { .. }));
        assert!(local.exists(&key()).await.unwrap().is_none());
        let leftovers = std::fs::read_dir(local.dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn partial_paths_are_unique() {
        let local = LocalCache::new("/cache");
        assert_ne!(local.partial_path(&key()), local.partial_path(&key()));
    }
}
