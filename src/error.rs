use std::path::PathBuf;

use nix::errno::Errno;

/// Every failure surface the supervisor can hit, from startup through shutdown.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("system call failed: {0}")]
    Nix(#[from] Errno),

    #[error("no commands configured: pass one on argv or populate {0}")]
    NoCommands(PathBuf),

    #[error("command directory {path} is not readable: {source}")]
    CommandDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {command:?}: {source}")]
    Spawn {
        command: Vec<String>,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    BadEnv { var: &'static str, value: String },

    /// wait-any reported ECHILD while guarded children were still believed alive.
    /// Should be unreachable outside a kernel/ptrace anomaly.
    #[error("reaper found no children but {expected} guarded pid(s) were still tracked")]
    ReapInconsistency { expected: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
