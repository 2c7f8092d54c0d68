//! Error types for sandbox lifecycle and runtime resolution.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for sandbox operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The sandbox name failed validation.
    #[error("invalid sandbox name {0:?}")]
    InvalidName(String),

    /// A record or worktree path already exists for the requested sandbox.
    #[error("{0}")]
    Conflict(String),

    /// No metadata record exists for the given name.
    #[error("sandbox {0:?} not found")]
    SandboxNotFound(String),

    /// The configuration file was required but is absent.
    #[error("devcontainer config not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// A persisted record could not be decoded.
    #[error("decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be serialized for writing.
    #[error("encode {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configuration file is malformed.
    #[error("parse devcontainer config {}: {reason}", .path.display())]
    ConfigParse { path: PathBuf, reason: String },

    /// Declared build inputs are missing or of the wrong kind.
    #[error("{0}")]
    BuildInput(String),

    /// An external process could not be started or exited unsuccessfully.
    #[error("{command}: {reason}{}", render_output(.output))]
    ExternalCommand {
        command: String,
        reason: String,
        code: Option<i32>,
        output: String,
    },

    /// No usable base ref could be determined.
    #[error("{0}")]
    InvalidBaseRef(String),

    /// One or more items of a batch operation failed.
    #[error("failed to clean some sandboxes:\n{}", render_failures(.failures))]
    Aggregate { failures: Vec<(String, Error)> },

    /// Tool settings file could not be read.
    #[error("invalid settings file {}: {reason}", .path.display())]
    Settings { path: PathBuf, reason: String },

    /// IO error during sandbox operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Exit status of the external process behind this error, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::ExternalCommand { code, .. } => *code,
            _ => None,
        }
    }

    /// Wraps an external command failure with a short description of the step.
    pub(crate) fn context(self, step: &str) -> Error {
        match self {
            Error::ExternalCommand {
                command,
                reason,
                code,
                output,
            } => Error::ExternalCommand {
                command: format!("{}: {}", step, command),
                reason,
                code,
                output,
            },
            other => other,
        }
    }
}

fn render_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{}", trimmed)
    }
}

fn render_failures(failures: &[(String, Error)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{}: {}", name, err))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, Error>;
