//! CLI command implementations

pub mod build;
pub mod install;
pub mod status;

pub use build::execute as build;
pub use install::execute as install;
pub use status::execute as status;

use crate::cache::{remote, CacheStore, LocalCache};
use crate::config::{Config, ConfigManager};
use crate::error::TarmacResult;
use crate::hash::{GlobalHash, HashEngine, PackageCacheMap};
use crate::report::{OutputContext, Reporter};
use crate::vcs::SourceControl;
use crate::workspace::{LernaGraph, PackageGraph};
use std::path::PathBuf;
use tracing::debug;

/// Everything a command needs about the repository it runs in
pub struct Workspace {
    pub root: PathBuf,
    pub config: Config,
    pub output: OutputContext,
}

impl Workspace {
    pub fn new(root: PathBuf, config: Config, output: OutputContext) -> Self {
        Self {
            root,
            config,
            output,
        }
    }

    /// Local tier plus the configured remote tier
    pub fn cache_store(&self) -> TarmacResult<CacheStore> {
        let dir = ConfigManager::cache_dir(&self.config, &self.root);
        debug!("Local cache: {}", dir.display());
        let remote = remote::from_config(&self.config.remote)?;
        Ok(CacheStore::new(LocalCache::new(dir), remote))
    }

    pub fn reporter(&self) -> Reporter {
        Reporter::stdout(self.output.clone())
    }

    pub fn package_graph(&self) -> LernaGraph {
        LernaGraph::new(
            &self.root,
            self.config.commands.list.clone(),
            self.config.commands.build_script.clone(),
        )
    }

    /// List packages and derive every cache key, in topological order
    pub async fn cache_keys(&self, vcs: &dyn SourceControl) -> TarmacResult<PackageCacheMap> {
        let packages = self.package_graph().packages().await?;
        debug!("{} workspace packages", packages.len());

        let global = GlobalHash::from_config(&self.root, &self.config.cache);
        // Surface a missing global file before any per-package work
        global.get().await?;

        HashEngine::new(vcs, &global).compute_all(&packages).await
    }
}
