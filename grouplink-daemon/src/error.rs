use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Registry(#[from] grouplink_core::RegistryError),

    #[error(transparent)]
    Sync(#[from] grouplink_sync::SyncError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} channel closed")]
    ChannelClosed(&'static str),

    /// An engine run failed inside the processor; carries its message.
    #[error("engine run failed: {0}")]
    Engine(String),

    #[error("{task} task panicked: {message}")]
    TaskPanicked {
        task: &'static str,
        message: String,
    },

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (no socket at {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn panicked(task: &'static str, err: tokio::task::JoinError) -> DaemonError {
    DaemonError::TaskPanicked {
        task,
        message: err.to_string(),
    }
}
