//! Errors returned by the download manager.
//!
//! Every failure carries an [`ErrorKind`] tag so hosts can branch on the kind
//! (e.g. treat `Cancelled` as a normal outcome) without matching on messages.

use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::progress::format_bytes;
use crate::registry::TaskId;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("artifact {artifact_id} is already installed at {}", .path.display())]
    AlreadyInstalled { artifact_id: String, path: PathBuf },

    #[error("artifact {artifact_id} is already downloading (task {task_id})")]
    AlreadyInProgress { artifact_id: String, task_id: TaskId },

    #[error(
        "insufficient disk space: need {}, have {}",
        format_bytes(*.required),
        format_bytes(*.available)
    )]
    InsufficientDiskSpace { required: u64, available: u64 },

    #[error("download failed: {0}")]
    Transport(#[source] FetchError),

    #[error("too many redirects (limit {0})")]
    RedirectExhausted(u32),

    #[error("download cancelled by user")]
    Cancelled,

    #[error("{}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no active download with task id {0}")]
    NotFound(TaskId),
}

/// Stable tag for a [`DownloadError`], as carried by `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AlreadyInstalled,
    AlreadyInProgress,
    InsufficientDiskSpace,
    Transport,
    RedirectExhausted,
    Cancelled,
    Filesystem,
    NotFound,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AlreadyInstalled => "already_installed",
            ErrorKind::AlreadyInProgress => "already_in_progress",
            ErrorKind::InsufficientDiskSpace => "insufficient_disk_space",
            ErrorKind::Transport => "transport",
            ErrorKind::RedirectExhausted => "redirect_exhausted",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::AlreadyInstalled { .. } => ErrorKind::AlreadyInstalled,
            DownloadError::AlreadyInProgress { .. } => ErrorKind::AlreadyInProgress,
            DownloadError::InsufficientDiskSpace { .. } => ErrorKind::InsufficientDiskSpace,
            DownloadError::Transport(_) => ErrorKind::Transport,
            DownloadError::RedirectExhausted(_) => ErrorKind::RedirectExhausted,
            DownloadError::Cancelled => ErrorKind::Cancelled,
            DownloadError::Filesystem { .. } => ErrorKind::Filesystem,
            DownloadError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Errors raised before any transfer starts. These are returned to the caller
    /// directly and never produce an event.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            DownloadError::AlreadyInstalled { .. }
                | DownloadError::AlreadyInProgress { .. }
                | DownloadError::InsufficientDiskSpace { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DownloadError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Map a fetch failure. Storage errors are attributed to `path` (the temp file).
    pub(crate) fn from_fetch(e: FetchError, path: &std::path::Path) -> Self {
        match e {
            FetchError::Cancelled => DownloadError::Cancelled,
            FetchError::RedirectExhausted(limit) => DownloadError::RedirectExhausted(limit),
            FetchError::Storage(source) => DownloadError::filesystem(path, source),
            other => DownloadError::Transport(other),
        }
    }
}
