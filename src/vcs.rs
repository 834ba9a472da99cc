//! Version-control file listings
//!
//! Cache keys hash tracked files; cache entries pack untracked files.
//! Both listings return paths relative to the queried directory.

use crate::error::{TarmacError, TarmacResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Lists files known (or unknown) to version control
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Tracked files under `dir`, relative to `dir`
    async fn tracked_files(&self, dir: &Path) -> TarmacResult<Vec<PathBuf>>;

    /// Untracked files (ignored ones included) under `dir`, relative to `dir`
    async fn untracked_files(&self, dir: &Path) -> TarmacResult<Vec<PathBuf>>;
}

/// `git ls-files` backed listings
#[derive(Debug, Default, Clone, Copy)]
pub struct Git;

impl Git {
    /// Create a git lister
    pub fn new() -> Self {
        Self
    }

    async fn ls_files(dir: &Path, extra: &[&str]) -> TarmacResult<Vec<PathBuf>> {
        let mut args = vec!["ls-files", "-z"];
        args.extend_from_slice(extra);
        debug!("Executing: git {:?} in {}", args, dir.display());

        let output = Command::new("git")
            .args(&args)
            .current_dir(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| TarmacError::command_failed(format!("git {:?}", args), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TarmacError::io(
                format!("git ls-files in {}", dir.display()),
                std::io::Error::other(stderr.trim().to_string()),
            ));
        }

        Ok(parse_nul_separated(&output.stdout))
    }
}

#[async_trait]
impl SourceControl for Git {
    async fn tracked_files(&self, dir: &Path) -> TarmacResult<Vec<PathBuf>> {
        Self::ls_files(dir, &[]).await
    }

    async fn untracked_files(&self, dir: &Path) -> TarmacResult<Vec<PathBuf>> {
        Self::ls_files(dir, &["--others"]).await
    }
}

fn parse_nul_separated(stdout: &[u8]) -> Vec<PathBuf> {
    stdout
        .split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .map(|entry| PathBuf::from(String::from_utf8_lossy(entry).into_owned()))
        .collect()
}
