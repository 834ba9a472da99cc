//! Two-tier content-addressed cache
//!
//! Entries are tar archives named by cache key. The local tier is a
//! directory on this machine; the optional remote tier is a shared blob
//! store. An entry's content is fully determined by its key, so entries
//! are never updated in place and concurrent writers of the same key are
//! harmless.
//!
//! # Entry lifecycle
//!
//! | Step | Tier | Operation |
//! |------|------|-----------|
//! | Restore | local | `exists_local` → `extract_local` |
//! | Restore | remote | `exists_remote` → `fetch_remote_to_local` → `extract_local` |
//! | Publish | local | `write_local_from_workspace` |
//! | Publish | remote | `publish_local_to_remote` (skipped when already present) |

pub mod archive;
pub mod local;
pub mod remote;

pub use local::LocalCache;
pub use remote::{DirectoryRemote, HttpRemote, RemoteStore};

use crate::error::{TarmacError, TarmacResult};
use crate::hash::CacheKey;
use crate::vcs::SourceControl;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

/// Size of a stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    pub size: u64,
}

/// Result of publishing one entry to the remote tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Local-only mode
    NoRemote,
    /// The remote already held the key
    AlreadyPresent,
    /// Uploaded in this run
    Uploaded { size: u64 },
}

type RemoteMemo = Arc<OnceCell<Option<EntryMeta>>>;

/// Local tier, optional remote tier, and the run's remote lookup memo
pub struct CacheStore {
    local: LocalCache,
    remote: Option<Arc<dyn RemoteStore>>,
    remote_seen: Mutex<HashMap<CacheKey, RemoteMemo>>,
}

impl CacheStore {
    pub fn new(local: LocalCache, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self {
            local,
            remote,
            remote_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    /// Whether a remote tier is configured
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Where the remote tier lives, for messages
    pub fn remote_description(&self) -> Option<String> {
        self.remote.as_ref().map(|r| r.describe())
    }

    pub async fn exists_local(&self, key: &CacheKey) -> TarmacResult<Option<EntryMeta>> {
        self.local.exists(key).await
    }

    /// Remote existence, looked up at most once per key per run.
    ///
    /// A failed lookup is not memoized, so a later call retries it.
    pub async fn exists_remote(&self, key: &CacheKey) -> TarmacResult<Option<EntryMeta>> {
        let Some(remote) = self.remote.as_ref() else {
            return Ok(None);
        };

        let cell = {
            let mut seen = self.remote_seen.lock().await;
            seen.entry(key.clone()).or_default().clone()
        };

        let meta = cell
            .get_or_try_init(|| async {
                let found = remote.head(&key.file_name()).await?;
                debug!(
                    "Remote {} {}",
                    key,
                    if found.is_some() { "has" } else { "lacks" }
                );
                Ok::<_, TarmacError>(found)
            })
            .await?;
        Ok(*meta)
    }

    /// Download an entry into the local tier.
    ///
    /// The download lands in a scratch file that is removed if anything
    /// fails, so the local tier never holds a truncated archive.
    pub async fn fetch_remote_to_local(&self, key: &CacheKey) -> TarmacResult<EntryMeta> {
        let remote = self
            .remote
            .clone()
            .ok_or_else(|| TarmacError::Internal(format!("fetch of {} without a remote", key)))?;
        let expected = self.exists_remote(key).await?;
        let object = key.file_name();

        let meta = self
            .local
            .write_atomically(key, |partial| async move {
                remote.get(&object, &partial).await?;
                let actual = tokio::fs::metadata(&partial)
                    .await
                    .map_err(|e| TarmacError::io(format!("inspecting {}", partial.display()), e))?
                    .len();
                match expected {
                    Some(EntryMeta { size }) if size > 0 && size != actual => {
                        Err(TarmacError::corrupt_archive(
                            &partial,
                            format!("expected {} bytes, received {}", size, actual),
                        ))
                    }
                    _ => Ok(()),
                }
            })
            .await?;

        info!("Fetched {} ({} bytes)", key, meta.size);
        Ok(meta)
    }

    /// Unpack a local entry over `dest`, merging with existing files
    pub async fn extract_local(&self, key: &CacheKey, dest: &Path) -> TarmacResult<()> {
        let archive = self.local.path(key);
        let dest = dest.to_path_buf();
        blocking(move || archive::unpack(&archive, &dest)).await
    }

    /// Archive a package's build output into the local tier.
    ///
    /// Build output is whatever version control does not track, minus
    /// `node_modules` and dot paths.
    pub async fn write_local_from_workspace(
        &self,
        key: &CacheKey,
        pkg_dir: &Path,
        vcs: &dyn SourceControl,
    ) -> TarmacResult<EntryMeta> {
        let untracked = vcs.untracked_files(pkg_dir).await?;
        let entries = archive::relevant_entries(&untracked);
        debug!("{}: {} output files", key, entries.len());

        let source = pkg_dir.to_path_buf();
        self.local
            .write_atomically(key, |partial| async move {
                blocking(move || archive::pack_files(&source, &entries, &partial).map(|_| ())).await
            })
            .await
    }

    /// Archive whole directories under `root` into the local tier
    pub async fn write_local_from_dirs(
        &self,
        key: &CacheKey,
        root: &Path,
        dirs: &[String],
    ) -> TarmacResult<EntryMeta> {
        let source = root.to_path_buf();
        let dirs = dirs.to_vec();
        self.local
            .write_atomically(key, |partial| async move {
                blocking(move || archive::pack_dirs(&source, &dirs, &partial).map(|_| ())).await
            })
            .await
    }

    /// Upload a local entry unless the remote already holds it
    pub async fn publish_local_to_remote(&self, key: &CacheKey) -> TarmacResult<PublishOutcome> {
        let Some(remote) = self.remote.as_ref() else {
            return Ok(PublishOutcome::NoRemote);
        };

        if self.exists_remote(key).await?.is_some() {
            debug!("Remote already has {}", key);
            return Ok(PublishOutcome::AlreadyPresent);
        }

        let meta = self.local.exists(key).await?.ok_or_else(|| {
            TarmacError::Internal(format!("{} is not in the local cache", key))
        })?;
        remote.put(&key.file_name(), &self.local.path(key)).await?;

        self.remote_seen
            .lock()
            .await
            .insert(key.clone(), Arc::new(OnceCell::new_with(Some(Some(meta)))));

        info!("Published {} ({} bytes)", key, meta.size);
        Ok(PublishOutcome::Uploaded { size: meta.size })
    }
}

async fn blocking<T, F>(f: F) -> TarmacResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> TarmacResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TarmacError::Internal(format!("archive task failed: {}", e)))?
}
