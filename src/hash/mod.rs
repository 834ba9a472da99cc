//! Cache key derivation
//!
//! A package key folds three inputs:
//!
//! 1. the content of the package's tracked files,
//! 2. the keys of its internal dependencies, sorted by dependency name,
//! 3. the global hash.
//!
//! Keys are computed strictly in topological order. A dependent's key reads
//! its dependencies' keys, so a change anywhere below a package changes the
//! package's key too.

pub mod digest;
pub mod global;
pub mod key;

pub use global::{dependency_cache_key, GlobalHash};
pub use key::{slugify, CacheKey};

use crate::error::{TarmacError, TarmacResult};
use crate::hash::digest::{hash_file_set, KeyHasher};
use crate::vcs::SourceControl;
use crate::workspace::PackageDescriptor;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// A package joined with its cache key
#[derive(Debug, Clone, Serialize)]
pub struct PackageCacheInfo {
    pub name: String,
    pub location: PathBuf,
    pub cache_key: CacheKey,
    pub has_build_step: bool,
}

/// Every package's cache info, in topological order
#[derive(Debug, Clone, Default)]
pub struct PackageCacheMap {
    packages: Vec<PackageCacheInfo>,
    index: HashMap<String, usize>,
}

impl PackageCacheMap {
    fn push(&mut self, info: PackageCacheInfo) {
        self.index.insert(info.name.clone(), self.packages.len());
        self.packages.push(info);
    }

    /// Look up a package by name
    pub fn get(&self, name: &str) -> Option<&PackageCacheInfo> {
        self.index.get(name).map(|&i| &self.packages[i])
    }

    /// All packages in topological order
    pub fn iter(&self) -> impl Iterator<Item = &PackageCacheInfo> {
        self.packages.iter()
    }

    /// Packages that define a build step
    pub fn buildable(&self) -> impl Iterator<Item = &PackageCacheInfo> {
        self.packages.iter().filter(|p| p.has_build_step)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Derives package cache keys
pub struct HashEngine<'a> {
    vcs: &'a dyn SourceControl,
    global: &'a GlobalHash,
}

impl<'a> HashEngine<'a> {
    pub fn new(vcs: &'a dyn SourceControl, global: &'a GlobalHash) -> Self {
        Self { vcs, global }
    }

    /// Hash of the package directory restricted to tracked files
    pub async fn content_hash(&self, pkg: &PackageDescriptor) -> TarmacResult<String> {
        let files = self.vcs.tracked_files(&pkg.location).await?;
        hash_file_set(&pkg.location, &files).await
    }

    /// Compute one package's key from already-resolved dependency keys.
    ///
    /// `resolved_deps` maps internal dependency name to key; iteration order
    /// of the map is the sorted name order that gets hashed.
    pub async fn package_cache_key(
        &self,
        pkg: &PackageDescriptor,
        resolved_deps: &BTreeMap<&str, &CacheKey>,
    ) -> TarmacResult<CacheKey> {
        let content = self.content_hash(pkg).await?;
        let global = self.global.get().await?;
        Ok(combine_key(
            &pkg.name,
            &content,
            resolved_deps,
            global,
            self.global.cache_bust(),
        ))
    }

    /// Compute every package's key, in the given (topological) order
    pub async fn compute_all(
        &self,
        packages: &[PackageDescriptor],
    ) -> TarmacResult<PackageCacheMap> {
        let internal: HashSet<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        let mut computed: HashMap<String, CacheKey> = HashMap::new();
        let mut map = PackageCacheMap::default();

        for pkg in packages {
            let key = {
                let deps = resolve_dependency_keys(pkg, &computed, &internal)?;
                self.package_cache_key(pkg, &deps).await?
            };
            debug!("{} -> {}", pkg.name, key);

            computed.insert(pkg.name.clone(), key.clone());
            map.push(PackageCacheInfo {
                name: pkg.name.clone(),
                location: pkg.location.clone(),
                cache_key: key,
                has_build_step: pkg.has_build_step,
            });
        }

        Ok(map)
    }
}

/// Collect the keys of `pkg`'s internal dependencies.
///
/// External dependencies are skipped; an internal dependency without a key
/// means the input was not topologically ordered.
pub fn resolve_dependency_keys<'m>(
    pkg: &'m PackageDescriptor,
    computed: &'m HashMap<String, CacheKey>,
    internal: &HashSet<&str>,
) -> TarmacResult<BTreeMap<&'m str, &'m CacheKey>> {
    let mut deps = BTreeMap::new();
    for dep in &pkg.dependency_names {
        if !internal.contains(dep.as_str()) || *dep == pkg.name {
            continue;
        }
        let key = computed.get(dep).ok_or_else(|| TarmacError::Topology {
            package: pkg.name.clone(),
            dependency: dep.clone(),
        })?;
        deps.insert(dep.as_str(), key);
    }
    Ok(deps)
}

/// Stable, order-sensitive combination of a package's key inputs
pub fn combine_key(
    name: &str,
    content_hash: &str,
    deps: &BTreeMap<&str, &CacheKey>,
    global_hash: &str,
    cache_bust: &str,
) -> CacheKey {
    let mut hasher = KeyHasher::new("package");
    // Slugs are lossy, so the exact name goes into the hash
    hasher.field(name);
    hasher.field(content_hash);
    hasher.field(deps.len().to_string());
    for key in deps.values() {
        hasher.field(key.as_str());
    }
    hasher.field(global_hash);
    CacheKey::new(name, &hasher.finish_short(), cache_bust)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Treats every regular file under a directory as tracked
    struct AllTracked;

    fn walk(base: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(base, &path, out);
            } else {
                out.push(path.strip_prefix(base).unwrap().to_path_buf());
            }
        }
    }

    #[async_trait]
    impl SourceControl for AllTracked {
        async fn tracked_files(&self, dir: &Path) -> TarmacResult<Vec<PathBuf>> {
            let mut out = Vec::new();
            walk(dir, dir, &mut out);
            Ok(out)
        }

        async fn untracked_files(&self, _dir: &Path) -> TarmacResult<Vec<PathBuf>> {
            Ok(vec![])
        }
    }

    struct Repo {
        dir: TempDir,
    }

    impl Repo {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("yarn.lock"), "lock").unwrap();
            Self { dir }
        }

        fn package(&self, name: &str, deps: &[&str]) -> PackageDescriptor {
            let location = self.dir.path().join("packages").join(name);
            fs::create_dir_all(location.join("src")).unwrap();
            fs::write(location.join("src").join("index.ts"), name).unwrap();
            PackageDescriptor {
                name: name.to_string(),
                location,
                dependency_names: deps.iter().map(|d| d.to_string()).collect(),
                has_build_step: true,
            }
        }

        fn edit(&self, name: &str, content: &str) {
            let file = self.dir.path().join("packages").join(name).join("src/index.ts");
            fs::write(file, content).unwrap();
        }

        async fn keys(&self, packages: &[PackageDescriptor]) -> PackageCacheMap {
            let global = GlobalHash::new(self.dir.path(), ["yarn.lock".to_string()], "v1");
            HashEngine::new(&AllTracked, &global)
                .compute_all(packages)
                .await
                .unwrap()
        }
    }

    fn key_of<'m>(map: &'m PackageCacheMap, name: &str) -> &'m CacheKey {
        &map.get(name).unwrap().cache_key
    }

    #[tokio::test]
    async fn keys_are_deterministic() {
        let repo = Repo::new();
        let packages = vec![repo.package("a", &[]), repo.package("b", &["a"])];

        let first = repo.keys(&packages).await;
        let second = repo.keys(&packages).await;

        assert_eq!(key_of(&first, "a"), key_of(&second, "a"));
        assert_eq!(key_of(&first, "b"), key_of(&second, "b"));
        assert!(key_of(&first, "a").as_str().starts_with("a-"));
        assert!(key_of(&first, "a").as_str().ends_with("-v1"));
    }

    #[tokio::test]
    async fn unrelated_packages_are_isolated() {
        let repo = Repo::new();
        let packages = vec![repo.package("a", &[]), repo.package("b", &[])];
        let before = repo.keys(&packages).await;

        repo.edit("a", "changed");
        let after = repo.keys(&packages).await;

        assert_ne!(key_of(&before, "a"), key_of(&after, "a"));
        assert_eq!(key_of(&before, "b"), key_of(&after, "b"));
    }

    #[tokio::test]
    async fn changes_propagate_to_dependents() {
        let repo = Repo::new();
        let packages = vec![
            repo.package("a", &[]),
            repo.package("d", &[]),
            repo.package("b", &["a", "react"]),
            repo.package("c", &["b"]),
        ];
        let before = repo.keys(&packages).await;

        repo.edit("a", "changed");
        let after = repo.keys(&packages).await;

        for name in ["a", "b", "c"] {
            assert_ne!(key_of(&before, name), key_of(&after, name), "{name}");
        }
        assert_eq!(key_of(&before, "d"), key_of(&after, "d"));
    }

    #[tokio::test]
    async fn dependency_declaration_order_does_not_matter() {
        let repo = Repo::new();
        let forward = vec![
            repo.package("a", &[]),
            repo.package("b", &[]),
            repo.package("c", &["a", "b"]),
        ];
        let mut reversed = forward.clone();
        reversed[2].dependency_names = vec!["b".to_string(), "a".to_string()];

        let one = repo.keys(&forward).await;
        let two = repo.keys(&reversed).await;
        assert_eq!(key_of(&one, "c"), key_of(&two, "c"));
    }

    #[tokio::test]
    async fn out_of_order_input_is_topology_error() {
        let repo = Repo::new();
        let packages = vec![repo.package("b", &["a"]), repo.package("a", &[])];
        let global = GlobalHash::new(repo.dir.path(), ["yarn.lock".to_string()], "v1");

        let err = HashEngine::new(&AllTracked, &global)
            .compute_all(&packages)
            .await
            .unwrap_err();
        match err {
            TarmacError::Topology {
                package,
                dependency,
            } => {
                assert_eq!(package, "b");
                assert_eq!(dependency, "a");
            }
            other => panic!("expected topology error, got {other:?}"),
        }
    }

    #[test]
    fn resolve_skips_external_dependencies() {
        let pkg = PackageDescriptor {
            name: "ui".to_string(),
            location: PathBuf::from("/repo/packages/ui"),
            dependency_names: vec!["react".to_string(), "utils".to_string()],
            has_build_step: true,
        };
        let mut computed = HashMap::new();
        computed.insert("utils".to_string(), CacheKey::new("utils", "abc", "v1"));
        let internal: HashSet<&str> = ["ui", "utils"].into_iter().collect();

        let deps = resolve_dependency_keys(&pkg, &computed, &internal).unwrap();
        assert_eq!(deps.keys().copied().collect::<Vec<_>>(), vec!["utils"]);
    }

    #[test]
    fn combine_key_depends_on_every_input() {
        let dep = CacheKey::new("utils", "abc", "v1");
        let mut deps = BTreeMap::new();
        deps.insert("utils", &dep);
        let base = combine_key("ui", "content", &deps, "global", "v1");

        assert_ne!(base, combine_key("ui", "other", &deps, "global", "v1"));
        assert_ne!(base, combine_key("ui", "content", &BTreeMap::new(), "global", "v1"));
        assert_ne!(base, combine_key("ui", "content", &deps, "global2", "v1"));
        assert_eq!(base, combine_key("ui", "content", &deps, "global", "v1"));
    }

    #[test]
    fn names_with_the_same_slug_get_distinct_keys() {
        let deps = BTreeMap::new();
        let scoped = combine_key("@a/b", "content", &deps, "global", "v1");
        let plain = combine_key("a/b", "content", &deps, "global", "v1");
        let underscored = combine_key("a__b", "content", &deps, "global", "v1");

        assert_ne!(scoped, plain);
        assert_ne!(scoped, underscored);
        assert_ne!(plain, underscored);
        assert!(scoped.as_str().starts_with("a__b-"));
    }

    #[tokio::test]
    async fn buildable_filters_packages() {
        let repo = Repo::new();
        let mut packages = vec![repo.package("a", &[]), repo.package("docs", &[])];
        packages[1].has_build_step = false;

        let map = repo.keys(&packages).await;
        assert_eq!(map.len(), 2);
        let names: Vec<&str> = map.buildable().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }
}
