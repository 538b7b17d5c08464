//! Events pushed to the host while downloads run.

use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{DownloadError, ErrorKind};
use crate::progress::ProgressSample;
use crate::registry::TaskId;

/// One notification about a task. For a given task, `Progress` events carry
/// non-decreasing byte counts and exactly one `Complete` or `Error` comes last.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
    Progress {
        task_id: TaskId,
        artifact_id: String,
        bytes: u64,
        total: u64,
        percentage: Option<f64>,
        bytes_per_sec: f64,
        eta_secs: Option<f64>,
    },
    Complete {
        task_id: TaskId,
        artifact_id: String,
        final_path: PathBuf,
    },
    Error {
        task_id: TaskId,
        artifact_id: String,
        kind: ErrorKind,
        message: String,
    },
}

impl DownloadEvent {
    pub fn progress(task_id: TaskId, artifact_id: &str, s: &ProgressSample) -> Self {
        DownloadEvent::Progress {
            task_id,
            artifact_id: artifact_id.to_string(),
            bytes: s.bytes,
            total: s.total,
            percentage: s.percentage,
            bytes_per_sec: s.bytes_per_sec,
            eta_secs: s.eta_secs,
        }
    }

    pub fn complete(task_id: TaskId, artifact_id: &str, final_path: PathBuf) -> Self {
        DownloadEvent::Complete {
            task_id,
            artifact_id: artifact_id.to_string(),
            final_path,
        }
    }

    pub fn error(task_id: TaskId, artifact_id: &str, err: &DownloadError) -> Self {
        DownloadEvent::Error {
            task_id,
            artifact_id: artifact_id.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        match self {
            DownloadEvent::Progress { task_id, .. }
            | DownloadEvent::Complete { task_id, .. }
            | DownloadEvent::Error { task_id, .. } => *task_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DownloadEvent::Progress { .. })
    }
}

/// Optional event channel. A closed receiver is not an error: the download
/// keeps going and later events are dropped.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<DownloadEvent>>,
}

impl EventSink {
    pub fn new(tx: Option<UnboundedSender<DownloadEvent>>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: DownloadEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::trace!("event receiver dropped");
            }
        }
    }
}
