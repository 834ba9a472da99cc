//! Status command - show cache keys and where each entry lives

use crate::cache::CacheStore;
use crate::cli::args::{OutputFormat, StatusArgs};
use crate::cli::commands::Workspace;
use crate::error::TarmacResult;
use crate::hash::{CacheKey, PackageCacheInfo};
use crate::vcs::Git;
use console::style;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::warn;

/// One package's cache state
#[derive(Debug, Serialize)]
pub struct PackageStatus {
    pub name: String,
    pub cache_key: CacheKey,
    pub has_build_step: bool,
    pub local: bool,
    /// `None` when no remote is configured or lookups were skipped
    pub remote: Option<bool>,
}

/// Execute the status command
pub async fn execute(args: StatusArgs, ws: &Workspace) -> TarmacResult<()> {
    let store = ws.cache_store()?;
    let keys = ws.cache_keys(&Git::new()).await?;
    let check_remote = store.has_remote() && !args.local_only;

    let statuses: Vec<PackageStatus> = join_all(
        keys.iter()
            .map(|pkg| package_status(&store, pkg, check_remote)),
    )
    .await
    .into_iter()
    .collect::<TarmacResult<_>>()?;

    match args.format {
        OutputFormat::Table => print_table(&statuses, ws.output.use_color()),
        OutputFormat::Json => print_json(&statuses)?,
        OutputFormat::Plain => print_plain(&statuses),
    }
    Ok(())
}

async fn package_status(
    store: &CacheStore,
    pkg: &PackageCacheInfo,
    check_remote: bool,
) -> TarmacResult<PackageStatus> {
    let local = store.exists_local(&pkg.cache_key).await?.is_some();
    let remote = if check_remote {
        match store.exists_remote(&pkg.cache_key).await {
            Ok(found) => Some(found.is_some()),
            Err(e) => {
                warn!("Remote lookup for {} failed: {}", pkg.name, e);
                None
            }
        }
    } else {
        None
    };

    Ok(PackageStatus {
        name: pkg.name.clone(),
        cache_key: pkg.cache_key.clone(),
        has_build_step: pkg.has_build_step,
        local,
        remote,
    })
}

/// Fixed-width yes/no cell; padded before styling so escape codes do not
/// skew the columns
fn cell(value: Option<bool>, color: bool) -> String {
    let styled = match value {
        Some(true) => style(format!("{:<6}", "yes")).green(),
        Some(false) => style(format!("{:<6}", "no")).red(),
        None => style(format!("{:<6}", "-")).dim(),
    };
    styled.force_styling(color).to_string()
}

fn print_table(statuses: &[PackageStatus], color: bool) {
    let name_width = statuses
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0)
        .max(7);

    println!(
        "{:<name_width$}  {:<6}  {:<6}  {}",
        style("PACKAGE").bold().force_styling(color),
        style("LOCAL").bold().force_styling(color),
        style("REMOTE").bold().force_styling(color),
        style("CACHE KEY").bold().force_styling(color)
    );
    println!("{}", "-".repeat(name_width + 60));

    for status in statuses {
        if !status.has_build_step {
            println!(
                "{:<name_width$}  {:<6}  {:<6}  {}",
                status.name, "-", "-", "(no build step)"
            );
            continue;
        }
        println!(
            "{:<name_width$}  {}  {}  {}",
            status.name,
            cell(Some(status.local), color),
            cell(status.remote, color),
            status.cache_key
        );
    }

    println!();
    let buildable = statuses.iter().filter(|s| s.has_build_step).count();
    let cached = statuses
        .iter()
        .filter(|s| s.has_build_step && s.local)
        .count();
    println!("{}/{} buildable package(s) cached locally", cached, buildable);
}

fn print_json(statuses: &[PackageStatus]) -> TarmacResult<()> {
    let json = serde_json::to_string_pretty(statuses)?;
    println!("{}", json);
    Ok(())
}

fn print_plain(statuses: &[PackageStatus]) {
    for status in statuses {
        println!("{}", status.cache_key);
    }
}
