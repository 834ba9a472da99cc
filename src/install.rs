//! Install-time dependency cache
//!
//! Installed dependencies are cached as one entry keyed by the lockfile.
//! A hit is unpacked into the workspace root before the installer runs, so
//! the installer finds everything in place and only verifies. A miss is
//! packed from the configured workspace directories after the installer
//! succeeds.

use crate::build::RestoreStatus;
use crate::cache::CacheStore;
use crate::config::schema::CacheConfig;
use crate::error::{TarmacError, TarmacResult};
use crate::hash::{dependency_cache_key, CacheKey};
use crate::report::Reporter;
use crate::workspace::{display_command, local_command};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{info, warn};

/// Installs workspace dependencies
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self) -> TarmacResult<()>;
}

/// Runs the configured install command from the workspace root
pub struct CommandInstaller {
    root: PathBuf,
    argv: Vec<String>,
}

impl CommandInstaller {
    pub fn new(root: &Path, argv: Vec<String>) -> Self {
        Self {
            root: root.to_path_buf(),
            argv,
        }
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn install(&self) -> TarmacResult<()> {
        let shown = display_command(&self.argv);
        info!("Running {}", shown);

        let mut cmd = local_command(&self.root, &self.argv)
            .ok_or_else(|| TarmacError::Internal("empty install command".to_string()))?;
        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| TarmacError::command_failed(&shown, e))?;

        if !status.success() {
            return Err(TarmacError::Installer {
                command: shown,
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

/// What happened to the dependency cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub key: CacheKey,
    pub status: RestoreStatus,
    /// Whether a fresh entry was stored after a miss
    pub stored: bool,
}

/// Restore, install, and populate the dependency cache
pub struct DependencyCache<'a> {
    root: &'a Path,
    cache: &'a CacheConfig,
    store: &'a CacheStore,
    installer: &'a dyn Installer,
    reporter: &'a Reporter,
}

impl<'a> DependencyCache<'a> {
    pub fn new(
        root: &'a Path,
        cache: &'a CacheConfig,
        store: &'a CacheStore,
        installer: &'a dyn Installer,
        reporter: &'a Reporter,
    ) -> Self {
        Self {
            root,
            cache,
            store,
            installer,
            reporter,
        }
    }

    pub async fn run(&self) -> TarmacResult<InstallOutcome> {
        let timer = self.reporter.phase("Install");
        let key = dependency_cache_key(self.root, &self.cache.lockfile, &self.cache.key).await?;

        let status = match self.restore(&key).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Dependency cache restore failed: {}", e);
                self.reporter
                    .step_warn(&format!("Dependency cache restore failed, installing: {}", e));
                RestoreStatus::Miss
            }
        };
        match status {
            RestoreStatus::LocalHit => {
                self.reporter.step_ok(&format!("Dependencies restored (local) {}", key))
            }
            RestoreStatus::RemoteHit => {
                self.reporter.step_ok(&format!("Dependencies restored (remote) {}", key))
            }
            RestoreStatus::Miss => self.reporter.step_info(&format!("Dependency cache miss {}", key)),
        }

        self.installer.install().await?;

        let mut stored = false;
        if status == RestoreStatus::Miss {
            match self.store_entry(&key).await {
                Ok(()) => {
                    stored = true;
                    self.reporter.step_ok(&format!("Dependency cache stored {}", key));
                }
                Err(e) => {
                    warn!("Dependency cache publish failed: {}", e);
                    self.reporter
                        .step_warn(&format!("Could not store dependency cache: {}", e));
                }
            }
        }

        self.reporter.phase_done(timer);
        Ok(InstallOutcome {
            key,
            status,
            stored,
        })
    }

    async fn restore(&self, key: &CacheKey) -> TarmacResult<RestoreStatus> {
        if self.store.exists_local(key).await?.is_some() {
            self.store.extract_local(key, self.root).await?;
            return Ok(RestoreStatus::LocalHit);
        }
        if self.store.exists_remote(key).await?.is_some() {
            self.store.fetch_remote_to_local(key).await?;
            self.store.extract_local(key, self.root).await?;
            return Ok(RestoreStatus::RemoteHit);
        }
        Ok(RestoreStatus::Miss)
    }

    async fn store_entry(&self, key: &CacheKey) -> TarmacResult<()> {
        self.store
            .write_local_from_dirs(key, self.root, &self.cache.workspace_dirs)
            .await?;
        self.store.publish_local_to_remote(key).await?;
        Ok(())
    }
}
