//! Install command - restore or populate the dependency cache

use crate::cli::commands::Workspace;
use crate::error::TarmacResult;
use crate::install::{CommandInstaller, DependencyCache};

/// Execute the install command
pub async fn execute(ws: &Workspace) -> TarmacResult<()> {
    let store = ws.cache_store()?;
    let reporter = ws.reporter();
    let installer = CommandInstaller::new(&ws.root, ws.config.commands.install.clone());

    DependencyCache::new(&ws.root, &ws.config.cache, &store, &installer, &reporter)
        .run()
        .await?;

    reporter.outro("Dependencies ready");
    Ok(())
}
