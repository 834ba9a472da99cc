//! Tarmac - content-addressed build cache for JavaScript monorepos
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use tarmac::cli::args::LogFormat;
use tarmac::cli::commands::Workspace;
use tarmac::cli::{Cli, Commands};
use tarmac::config::ConfigManager;
use tarmac::error::{TarmacError, TarmacResult};
use tarmac::report::OutputContext;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> TarmacResult<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().map_err(|e| TarmacError::io("getting current directory", e))?;
    let root = ConfigManager::find_workspace_root(&cwd)?;

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::for_root(&root),
    };
    let config = config_manager.load_with(&cli.cache.overrides()).await?;

    let json_logs = match cli.log_format {
        Some(format) => format == LogFormat::Json,
        None => config.general.log_format.eq_ignore_ascii_case("json"),
    };
    init_logging(cli.verbose, json_logs);
    debug!("Workspace root: {}", root.display());
    debug!("Config: {}", config_manager.path().display());

    let output = if cli.no_color {
        OutputContext::plain()
    } else {
        OutputContext::detect()
    };
    let ws = Workspace::new(root, config, output);

    match cli.command {
        Commands::Install => tarmac::cli::commands::install(&ws).await,
        Commands::Build(args) => tarmac::cli::commands::build(args, &ws).await,
        Commands::Status(args) => tarmac::cli::commands::status(args, &ws).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => EnvFilter::new("tarmac=warn"),
        1 => EnvFilter::new("tarmac=info"),
        _ => EnvFilter::new("tarmac=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
