//! Restore, build, publish
//!
//! The orchestrator runs three phases over packages that define a build
//! step:
//!
//! 1. **Restore** every package concurrently: local hit, else remote hit,
//!    else miss.
//! 2. **Build** the missed packages with one runner invocation scoped to
//!    exactly that set. Nothing runs when every package was restored.
//! 3. **Publish** every package the runner built, concurrently: archive its
//!    output into the local tier, then upload it unless the remote has it.
//!    A runner that reports nothing to build publishes nothing.
//!
//! A restore or publish failure only affects its own package: it is
//! reported and the package is treated as a miss (restore) or skipped
//! (publish). Configuration, topology and runner failures abort the run.

pub mod runner;

pub use runner::{BuildOutcome, BuildRunner, CommandRunner};

use crate::cache::{CacheStore, PublishOutcome};
use crate::error::TarmacResult;
use crate::hash::{PackageCacheInfo, PackageCacheMap};
use crate::report::{Reporter, TaskWriter};
use crate::vcs::SourceControl;
use futures_util::future::join_all;
use std::fmt;
use tracing::{debug, warn};

/// Where a package's output came from during restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStatus {
    LocalHit,
    RemoteHit,
    Miss,
}

/// Counts for the closing summary line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub local_hits: usize,
    pub remote_hits: usize,
    /// Packages the runner built
    pub built: Vec<String>,
    pub published: usize,
    pub publish_failed: usize,
    /// Restores that failed and fell back to building
    pub restore_failed: usize,
}

impl RunSummary {
    pub fn cached(&self) -> usize {
        self.local_hits + self.remote_hits
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cached ({} local, {} remote), {} built",
            self.cached(),
            self.local_hits,
            self.remote_hits,
            self.built.len()
        )?;
        if self.publish_failed > 0 {
            write!(f, ", {} failed to publish", self.publish_failed)?;
        }
        Ok(())
    }
}

/// Drives one build run
pub struct Orchestrator<'a> {
    store: &'a CacheStore,
    vcs: &'a dyn SourceControl,
    runner: &'a dyn BuildRunner,
    reporter: &'a Reporter,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a CacheStore,
        vcs: &'a dyn SourceControl,
        runner: &'a dyn BuildRunner,
        reporter: &'a Reporter,
    ) -> Self {
        Self {
            store,
            vcs,
            runner,
            reporter,
        }
    }

    /// Run all three phases
    pub async fn run(&self, packages: &PackageCacheMap) -> TarmacResult<RunSummary> {
        let mut summary = RunSummary::default();

        let missed = self.restore_phase(packages, &mut summary).await;
        let built = self.build_phase(missed, &mut summary).await?;
        self.publish_phase(&built, &mut summary).await;

        Ok(summary)
    }

    async fn restore_phase<'p>(
        &self,
        packages: &'p PackageCacheMap,
        summary: &mut RunSummary,
    ) -> Vec<&'p PackageCacheInfo> {
        let timer = self.reporter.phase("Restore");

        let buildable: Vec<&PackageCacheInfo> = packages.buildable().collect();
        let results = join_all(buildable.iter().map(|pkg| async move {
            let writer = self.reporter.task(&pkg.name);
            let status = match self.restore_one(pkg, &writer).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Restore of {} failed: {}", pkg.name, e);
                    writer.log(format!("restore failed, will build: {}", e));
                    writer.close();
                    return (*pkg, RestoreStatus::Miss, true);
                }
            };
            writer.close();
            (*pkg, status, false)
        }))
        .await;

        let mut missed = Vec::new();
        for (pkg, status, failed) in results {
            match status {
                RestoreStatus::LocalHit => summary.local_hits += 1,
                RestoreStatus::RemoteHit => summary.remote_hits += 1,
                RestoreStatus::Miss => missed.push(pkg),
            }
            if failed {
                summary.restore_failed += 1;
            }
        }

        self.reporter.phase_done(timer);
        missed
    }

    async fn restore_one(
        &self,
        pkg: &PackageCacheInfo,
        writer: &TaskWriter,
    ) -> TarmacResult<RestoreStatus> {
        let key = &pkg.cache_key;

        if self.store.exists_local(key).await?.is_some() {
            self.store.extract_local(key, &pkg.location).await?;
            writer.log(format!("cache hit (local) {}", key));
            return Ok(RestoreStatus::LocalHit);
        }

        if self.store.exists_remote(key).await?.is_some() {
            self.store.fetch_remote_to_local(key).await?;
            self.store.extract_local(key, &pkg.location).await?;
            writer.log(format!("cache hit (remote) {}", key));
            return Ok(RestoreStatus::RemoteHit);
        }

        writer.log(format!("cache miss {}", key));
        Ok(RestoreStatus::Miss)
    }

    /// Returns the packages whose output the runner actually produced
    async fn build_phase<'p>(
        &self,
        missed: Vec<&'p PackageCacheInfo>,
        summary: &mut RunSummary,
    ) -> TarmacResult<Vec<&'p PackageCacheInfo>> {
        let timer = self.reporter.phase("Build");

        if missed.is_empty() {
            self.reporter
                .step_ok("Every package was restored from cache, nothing to build");
            self.reporter.phase_done(timer);
            return Ok(missed);
        }

        let names: Vec<String> = missed.iter().map(|p| p.name.clone()).collect();
        self.reporter
            .step_info(&format!("Building {} package(s): {}", names.len(), names.join(", ")));

        let built = match self.runner.build(&names).await? {
            BuildOutcome::Built => {
                self.reporter.step_ok("Build finished");
                summary.built = names;
                missed
            }
            BuildOutcome::NothingToBuild => {
                // Workspace output predates these keys, so none of it is stored
                self.reporter
                    .step_warn("Build runner found nothing to build, skipping publish");
                Vec::new()
            }
        };

        self.reporter.phase_done(timer);
        Ok(built)
    }

    async fn publish_phase(&self, built: &[&PackageCacheInfo], summary: &mut RunSummary) {
        if built.is_empty() {
            return;
        }
        let timer = self.reporter.phase("Publish");

        let results = join_all(built.iter().map(|pkg| async move {
            let writer = self.reporter.task(&pkg.name);
            let result = self.publish_one(pkg, &writer).await;
            if let Err(ref e) = result {
                warn!("Publish of {} failed: {}", pkg.name, e);
                writer.log(format!("publish failed: {}", e));
            }
            writer.close();
            result.is_ok()
        }))
        .await;

        for ok in results {
            if ok {
                summary.published += 1;
            } else {
                summary.publish_failed += 1;
            }
        }

        self.reporter.phase_done(timer);
    }

    async fn publish_one(&self, pkg: &PackageCacheInfo, writer: &TaskWriter) -> TarmacResult<()> {
        let key = &pkg.cache_key;
        let meta = self
            .store
            .write_local_from_workspace(key, &pkg.location, self.vcs)
            .await?;
        debug!("{} stored locally ({} bytes)", key, meta.size);

        match self.store.publish_local_to_remote(key).await? {
            PublishOutcome::NoRemote => writer.log(format!("stored {}", key)),
            PublishOutcome::AlreadyPresent => {
                writer.log(format!("stored {} (remote already had it)", key))
            }
            PublishOutcome::Uploaded { size } => {
                writer.log(format!("stored and uploaded {} ({} bytes)", key, size))
            }
        }
        Ok(())
    }
}
