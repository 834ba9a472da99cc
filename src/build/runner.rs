//! External build runner invocation

use crate::error::{TarmacError, TarmacResult};
use crate::workspace::{display_command, local_command};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info};

/// stderr text of a filtered run that matched nothing
pub const NOTHING_TO_BUILD: &str = "No packages remain after filtering";

/// How a runner invocation ended, when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built,
    /// The runner filtered every package away; treated as success
    NothingToBuild,
}

/// Builds a set of packages
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Build exactly the named packages, dependencies first
    async fn build(&self, packages: &[String]) -> TarmacResult<BuildOutcome>;
}

/// Runs the configured build command with one `--scope` per package
pub struct CommandRunner {
    root: PathBuf,
    argv: Vec<String>,
}

impl CommandRunner {
    pub fn new(root: &Path, argv: Vec<String>) -> Self {
        Self {
            root: root.to_path_buf(),
            argv,
        }
    }

    /// Full command line for a scoped run
    pub fn scoped_argv(&self, packages: &[String]) -> Vec<String> {
        let mut argv = self.argv.clone();
        for name in packages {
            argv.push("--scope".to_string());
            argv.push(name.clone());
        }
        argv
    }
}

#[async_trait]
impl BuildRunner for CommandRunner {
    async fn build(&self, packages: &[String]) -> TarmacResult<BuildOutcome> {
        let argv = self.scoped_argv(packages);
        let shown = display_command(&argv);
        info!("Running {}", shown);

        let mut cmd = local_command(&self.root, &argv)
            .ok_or_else(|| TarmacError::Internal("empty build command".to_string()))?;
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TarmacError::command_failed(&shown, e))?;

        let mut retained = String::new();
        let streamed = match child.stderr.take() {
            Some(stderr) => pass_through(stderr, &mut retained).await,
            None => Ok(()),
        };

        // Reap the child before reporting a read failure
        let status = child
            .wait()
            .await
            .map_err(|e| TarmacError::command_failed(&shown, e))?;
        streamed.map_err(|e| TarmacError::io("reading build output", e))?;
        classify(&shown, status.success(), status.code(), &retained)
    }
}

/// Echo a stream to our stderr line by line and keep a copy.
///
/// Build tools print whatever bytes they like; invalid UTF-8 is replaced.
async fn pass_through<R>(stream: R, retained: &mut String) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);
        eprintln!("{}", line);
        retained.push_str(line);
        retained.push('\n');
    }
}

fn classify(
    command: &str,
    success: bool,
    code: Option<i32>,
    stderr: &str,
) -> TarmacResult<BuildOutcome> {
    if stderr.contains(NOTHING_TO_BUILD) {
        debug!("Runner reported nothing to build");
        return Ok(BuildOutcome::NothingToBuild);
    }
    if success {
        return Ok(BuildOutcome::Built);
    }
    Err(TarmacError::BuildRunner {
        command: command.to_string(),
        code: code.unwrap_or(-1),
    })
}
