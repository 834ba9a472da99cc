//! SHA256 helpers shared by the global hash and package keys

use crate::error::{TarmacError, TarmacResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hex characters kept from a combined digest in a cache key
pub const KEY_HASH_LEN: usize = 32;

/// Order-sensitive combining hasher.
///
/// Every field is length-prefixed so `("ab", "c")` and `("a", "bc")`
/// never collide.
pub struct KeyHasher {
    inner: Sha256,
}

impl KeyHasher {
    /// Start a hasher scoped to a domain tag
    pub fn new(domain: &str) -> Self {
        let mut hasher = Self {
            inner: Sha256::new(),
        };
        hasher.field(domain);
        hasher
    }

    /// Append one field
    pub fn field(&mut self, bytes: impl AsRef<[u8]>) -> &mut Self {
        let bytes = bytes.as_ref();
        self.inner.update((bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
        self
    }

    /// Full hex digest
    pub fn finish(self) -> String {
        hex::encode(self.inner.finalize())
    }

    /// Truncated hex digest for use inside a cache key
    pub fn finish_short(self) -> String {
        let mut hash = self.finish();
        hash.truncate(KEY_HASH_LEN);
        hash
    }
}

/// Hash a file's contents using SHA256
pub async fn hash_file_contents(path: &Path) -> TarmacResult<String> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|e| TarmacError::io(format!("reading {}", path.display()), e))?;

    Ok(hex::encode(Sha256::digest(&contents)))
}

/// Hash a set of files under `dir`.
///
/// Paths are sorted before hashing. A listed path that no longer exists
/// (deleted but still tracked) and a listed directory (a submodule) each
/// hash to a fixed marker instead of failing.
pub async fn hash_file_set(dir: &Path, files: &[PathBuf]) -> TarmacResult<String> {
    let mut sorted: Vec<&PathBuf> = files.iter().collect();
    sorted.sort();
    sorted.dedup();

    let mut hasher = KeyHasher::new("files");
    for relative in sorted {
        let full = dir.join(relative);
        let digest = match tokio::fs::metadata(&full).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => "deleted".to_string(),
            Err(e) => {
                return Err(TarmacError::io(format!("inspecting {}", full.display()), e));
            }
            Ok(meta) if meta.is_dir() => "directory".to_string(),
            Ok(_) => hash_file_contents(&full).await?,
        };
        // Normalise separators so Windows and Unix agree
        hasher.field(relative.to_string_lossy().replace('\\', "/"));
        hasher.field(digest);
    }
    Ok(hasher.finish())
}
