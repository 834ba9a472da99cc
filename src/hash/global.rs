//! Repo-wide invalidation salt
//!
//! The global hash folds the lockfile, the configured global dependency
//! files, and the cache-bust key. Any change to one of them changes every
//! package key.

use crate::config::schema::CacheConfig;
use crate::error::{TarmacError, TarmacResult};
use crate::hash::digest::{hash_file_contents, KeyHasher};
use crate::hash::key::CacheKey;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::debug;

/// Slug used for the install-time dependency cache entry
pub const DEPENDENCY_CACHE_SLUG: &str = "deps";

/// Run-scoped, compute-once global hash
pub struct GlobalHash {
    root: PathBuf,
    files: Vec<String>,
    cache_bust: String,
    value: OnceCell<String>,
}

impl GlobalHash {
    /// Create a global hash over `files` (relative to `root`)
    pub fn new(root: &Path, files: impl IntoIterator<Item = String>, cache_bust: &str) -> Self {
        let mut files: Vec<String> = files.into_iter().collect();
        files.sort();
        files.dedup();
        Self {
            root: root.to_path_buf(),
            files,
            cache_bust: cache_bust.to_string(),
            value: OnceCell::new(),
        }
    }

    /// Create from the cache section of the configuration
    pub fn from_config(root: &Path, cache: &CacheConfig) -> Self {
        let files = cache
            .global_dependencies
            .iter()
            .cloned()
            .chain(std::iter::once(cache.lockfile.clone()));
        Self::new(root, files, &cache.key)
    }

    /// The cache-bust key appended to every cache key
    pub fn cache_bust(&self) -> &str {
        &self.cache_bust
    }

    /// Files folded into the hash, sorted
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Compute the hash once; later calls return the first result
    pub async fn get(&self) -> TarmacResult<&str> {
        self.value
            .get_or_try_init(|| self.compute())
            .await
            .map(String::as_str)
    }

    async fn compute(&self) -> TarmacResult<String> {
        let mut hasher = KeyHasher::new("global");
        for file in &self.files {
            let digest = hash_required(&self.root.join(file)).await?;
            hasher.field(file);
            hasher.field(digest);
        }
        hasher.field(&self.cache_bust);

        let hash = hasher.finish();
        debug!("Global hash over {} files: {}", self.files.len(), hash);
        Ok(hash)
    }
}

/// Key of the install-time dependency cache: lockfile content plus cache-bust key
pub async fn dependency_cache_key(
    root: &Path,
    lockfile: &str,
    cache_bust: &str,
) -> TarmacResult<CacheKey> {
    let digest = hash_required(&root.join(lockfile)).await?;
    let mut hasher = KeyHasher::new("dependencies");
    hasher.field(lockfile).field(digest).field(cache_bust);
    Ok(CacheKey::new(
        DEPENDENCY_CACHE_SLUG,
        &hasher.finish_short(),
        cache_bust,
    ))
}

async fn hash_required(path: &Path) -> TarmacResult<String> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(TarmacError::GlobalFileMissing(path.to_path_buf()));
    }
    hash_file_contents(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("yarn.lock"), "lock v1").unwrap();
        fs::write(dir.path().join("tsconfig.json"), "{}").unwrap();
        dir
    }

    #[tokio::test]
    async fn memoized_first_value_wins() {
        let dir = repo();
        let global = GlobalHash::new(dir.path(), ["yarn.lock".to_string()], "v1");

        let first = global.get().await.unwrap().to_string();
        fs::write(dir.path().join("yarn.lock"), "lock v2").unwrap();
        let second = global.get().await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn file_order_and_duplicates_do_not_matter() {
        let dir = repo();
        let a = GlobalHash::new(
            dir.path(),
            ["yarn.lock".to_string(), "tsconfig.json".to_string()],
            "v1",
        );
        let b = GlobalHash::new(
            dir.path(),
            [
                "tsconfig.json".to_string(),
                "yarn.lock".to_string(),
                "yarn.lock".to_string(),
            ],
            "v1",
        );
        assert_eq!(a.get().await.unwrap(), b.get().await.unwrap());
    }

    #[tokio::test]
    async fn cache_bust_changes_hash() {
        let dir = repo();
        let a = GlobalHash::new(dir.path(), ["yarn.lock".to_string()], "v1");
        let b = GlobalHash::new(dir.path(), ["yarn.lock".to_string()], "v2");
        assert_ne!(a.get().await.unwrap(), b.get().await.unwrap());
    }

    #[tokio::test]
    async fn missing_file_is_config_error() {
        let dir = repo();
        let global = GlobalHash::new(dir.path(), ["babel.config.js".to_string()], "v1");
        let err = global.get().await.unwrap_err();
        assert!(matches!(err, TarmacError::GlobalFileMissing(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn from_config_includes_lockfile() {
        let dir = repo();
        let cache = CacheConfig {
            global_dependencies: vec!["tsconfig.json".to_string()],
            ..Default::default()
        };
        let global = GlobalHash::from_config(dir.path(), &cache);
        assert_eq!(global.files(), ["tsconfig.json", "yarn.lock"]);
        assert_eq!(global.cache_bust(), "v1");
    }

    #[tokio::test]
    async fn dependency_key_tracks_lockfile() {
        let dir = repo();
        let before = dependency_cache_key(dir.path(), "yarn.lock", "v1")
            .await
            .unwrap();
        assert!(before.as_str().starts_with("deps-"));
        assert!(before.as_str().ends_with("-v1"));

        fs::write(dir.path().join("yarn.lock"), "lock v2").unwrap();
        let after = dependency_cache_key(dir.path(), "yarn.lock", "v1")
            .await
            .unwrap();
        assert_ne!(before, after);
    }
}
