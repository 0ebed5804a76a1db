use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Soft denial; the reason is relayed to the pusher verbatim.
    #[error("{0}")]
    PolicyDenied(String),

    /// The ACL configuration file could not be written. No compile was
    /// attempted.
    #[error("failed to write ACL configuration to {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The ACL configuration was written but the external compiler rejected
    /// it. The on-disk file is valid and is left in place; the compile must
    /// be retried once the environment is fixed.
    #[error("ACL compiler exited with {status}: {stderr}")]
    Compile {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },

    #[error("hook plugin '{plugin}' failed: {reason}")]
    Plugin { plugin: String, reason: String },

    /// Terminal outcome of a dispatch that accumulated at least one hard
    /// failure; mapped to a nonzero process exit by the hook binary.
    #[error("push rejected: {0}")]
    PushRejected(String),

    #[error("malformed change line: {0:?}")]
    MalformedChange(String),

    #[error("operation '{operation}' is not supported by the '{backend}' auth backend")]
    UnsupportedOperation {
        operation: &'static str,
        backend: &'static str,
    },

    #[error("unknown auth backend: {0}")]
    UnknownBackend(String),
}

pub type Result<T> = std::result::Result<T, Error>;
