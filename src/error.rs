//! Error types for tarmac
//!
//! All modules use `TarmacResult<T>` as their return type. Variants are
//! grouped by how the orchestrator treats them: configuration and topology
//! errors abort the run, transport and archive errors degrade a single
//! package to a cache miss.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tarmac operations
pub type TarmacResult<T> = Result<T, TarmacError>;

/// All errors that can occur in tarmac
#[derive(Error, Debug)]
pub enum TarmacError {
    // Configuration errors
    #[error("Could not find workspace root above {0}")]
    WorkspaceRootNotFound(PathBuf),

    #[error("Manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Invalid manifest at {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Global dependency file not found: {0}")]
    GlobalFileMissing(PathBuf),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Graph errors
    #[error("Cache key for {package} requested before its dependency {dependency} was hashed")]
    Topology { package: String, dependency: String },

    #[error("Failed to list workspace packages: {0}")]
    PackageList(String),

    // Transport errors
    #[error("Remote cache error for {key}: {reason}")]
    Transport { key: String, reason: String },

    #[error("Remote cache returned HTTP {status} for {key}")]
    RemoteStatus { key: String, status: u16 },

    // Archive errors
    #[error("Corrupt cache archive {path}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    // Subprocess errors
    #[error("Build failed: {command} exited with code {code}")]
    BuildRunner { command: String, code: i32 },

    #[error("Dependency install failed: {command} exited with code {code}")]
    Installer { command: String, code: i32 },

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TarmacError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a transport error for a cache key
    pub fn transport(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a corrupt archive error
    pub fn corrupt_archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CorruptArchive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error must abort the whole run.
    ///
    /// Everything else is caught per package and resolved to a cache miss.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::WorkspaceRootNotFound(_)
                | Self::ManifestNotFound(_)
                | Self::ManifestInvalid { .. }
                | Self::GlobalFileMissing(_)
                | Self::ConfigInvalid { .. }
                | Self::Topology { .. }
                | Self::PackageList(_)
                | Self::BuildRunner { .. }
                | Self::Installer { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::WorkspaceRootNotFound(_) => {
                Some("Run inside a repository whose package.json declares \"workspaces\"")
            }
            Self::GlobalFileMissing(_) => {
                Some("Check cache.global_dependencies and cache.lockfile in tarmac.toml")
            }
            Self::Topology { .. } => {
                Some("The package list must be topologically sorted (lerna ls --toposort)")
            }
            Self::RemoteStatus { status: 401 | 403, .. } => {
                Some("Check TARMAC_REMOTE_TOKEN or remote.token in tarmac.toml")
            }
            _ => None,
        }
    }
}
