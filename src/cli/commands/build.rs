//! Build command - install, then restore, build and publish

use crate::build::{CommandRunner, Orchestrator};
use crate::cli::args::BuildArgs;
use crate::cli::commands::Workspace;
use crate::error::TarmacResult;
use crate::install::{CommandInstaller, DependencyCache};
use crate::report::format_elapsed;
use crate::vcs::Git;
use std::time::Instant;

/// Execute the build command
pub async fn execute(args: BuildArgs, ws: &Workspace) -> TarmacResult<()> {
    let started = Instant::now();
    let store = ws.cache_store()?;
    let reporter = ws.reporter();

    if let Some(remote) = store.remote_description() {
        reporter.step_info(&format!("Remote cache: {}", remote));
    } else {
        reporter.step_info("No remote cache configured, using the local cache only");
    }

    if !args.skip_install {
        let installer = CommandInstaller::new(&ws.root, ws.config.commands.install.clone());
        DependencyCache::new(&ws.root, &ws.config.cache, &store, &installer, &reporter)
            .run()
            .await?;
    }

    let vcs = Git::new();
    let timer = reporter.phase("Hash");
    let keys = ws.cache_keys(&vcs).await?;
    reporter.step_ok(&format!(
        "{} package(s), {} with a build step",
        keys.len(),
        keys.buildable().count()
    ));
    reporter.phase_done(timer);

    let runner = CommandRunner::new(&ws.root, ws.config.commands.build.clone());
    let summary = Orchestrator::new(&store, &vcs, &runner, &reporter)
        .run(&keys)
        .await?;

    if summary.publish_failed > 0 || summary.restore_failed > 0 {
        reporter.step_warn("Some cache operations failed; see the lines above");
    }
    reporter.outro(&format!(
        "{} in {}",
        summary,
        format_elapsed(started.elapsed())
    ));
    Ok(())
}
