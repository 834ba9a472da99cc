//! CLI argument definitions using clap derive

use crate::config::Overrides;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tarmac - content-addressed build cache for JavaScript monorepos
///
/// Restores package build output from a local or shared cache, builds
/// only what changed, and publishes fresh output for the next run.
#[derive(Parser, Debug)]
#[command(name = "tarmac")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path (defaults to <workspace root>/tarmac.toml)
    #[arg(short, long, global = true, env = "TARMAC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Diagnostic log format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(flatten)]
    pub cache: CacheArgs,
}

/// Settings that override tarmac.toml
#[derive(Args, Debug, Default, Clone)]
pub struct CacheArgs {
    /// Cache-busting key appended to every cache key
    #[arg(long, global = true, env = "TARMAC_CACHE_KEY")]
    pub cache_key: Option<String>,

    /// Local cache folder
    #[arg(long, global = true, env = "TARMAC_CACHE_FOLDER")]
    pub cache_folder: Option<String>,

    /// Remote cache URL (https://... or file://...)
    #[arg(long, global = true, env = "TARMAC_REMOTE_URL")]
    pub remote_url: Option<String>,

    /// Remote bucket name
    #[arg(long, global = true, env = "TARMAC_BUCKET")]
    pub bucket: Option<String>,

    /// Remote bearer token
    #[arg(long, global = true, env = "TARMAC_REMOTE_TOKEN", hide_env_values = true)]
    pub remote_token: Option<String>,
}

impl CacheArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            cache_key: self.cache_key.clone(),
            cache_folder: self.cache_folder.clone(),
            remote_url: self.remote_url.clone(),
            bucket: self.bucket.clone(),
            token: self.remote_token.clone(),
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore or populate the dependency cache, then run the installer
    Install,

    /// Install, then restore, build and publish workspace packages
    Build(BuildArgs),

    /// Show each package's cache key and where it is cached
    Status(StatusArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Skip the dependency install step
    #[arg(long)]
    pub skip_install: bool,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,

    /// Skip remote lookups
    #[arg(long)]
    pub local_only: bool,
}

/// Output format for the status command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Cache keys only (one per line)
    Plain,
}

/// Diagnostic log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
