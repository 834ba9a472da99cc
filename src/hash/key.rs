//! Cache key formatting

use serde::Serialize;
use std::fmt;

/// Archive extension for cache entries
pub const ARCHIVE_EXT: &str = "tar";

/// Identifier of one version of one package's build output.
///
/// Formatted as `<slug>-<hash>[-<cacheBustKey>]`, safe both as a file name
/// and as a remote object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a package name, a hash, and the cache-bust key
    pub fn new(name: &str, hash: &str, cache_bust: &str) -> Self {
        let slug = slugify(name);
        if cache_bust.is_empty() {
            Self(format!("{}-{}", slug, hash))
        } else {
            Self(format!("{}-{}-{}", slug, hash, slugify(cache_bust)))
        }
    }

    /// The key string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the archive in either tier
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, ARCHIVE_EXT)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Make a package name safe for file names and object keys.
///
/// `@scope/name` becomes `scope__name`; any other character outside
/// `[A-Za-z0-9._-]` becomes `_`.
pub fn slugify(name: &str) -> String {
    name.trim_start_matches('@')
        .replace('/', "__")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
