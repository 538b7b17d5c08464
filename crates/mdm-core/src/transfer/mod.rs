//! Drives one task from `queued` to a terminal state.
//!
//! `queued → downloading` when the temp file is created and the request goes out.
//! From `downloading` the task ends in exactly one of:
//! - `completed`: the stream ended cleanly and the temp file was installed;
//! - `cancelled`: the cancel token was seen on a chunk before the stream ended;
//! - `failed`: transport, redirect, write or install error.
//!
//! The temp file is gone and the task retired from the registry before the
//! terminal event is sent, except on `completed`, where the file has been renamed.

mod sink;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::MdmConfig;
use crate::error::DownloadError;
use crate::event::{DownloadEvent, EventSink};
use crate::fetch::{self, FetchOptions};
use crate::progress::DEFAULT_INTERVAL;
use crate::registry::{Registry, TaskHandle, TaskState};
use crate::storage::{self, TempWriter};

use sink::TransferSink;

/// Runtime options shared by every transfer of a manager.
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    pub fetch: FetchOptions,
    /// Minimum spacing of progress events per task.
    pub progress_interval: Duration,
    /// Turn an insufficient free-space reading into a pre-flight error.
    pub require_disk_space: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            fetch: FetchOptions::default(),
            progress_interval: DEFAULT_INTERVAL,
            require_disk_space: false,
        }
    }
}

impl TransferOptions {
    pub fn from_config(cfg: &MdmConfig) -> Self {
        Self {
            fetch: FetchOptions {
                connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
                idle_timeout: Duration::from_secs(cfg.idle_timeout_secs),
                max_redirects: cfg.max_redirects,
            },
            progress_interval: Duration::from_millis(cfg.progress_interval_ms),
            require_disk_space: cfg.require_disk_space,
        }
    }
}

/// Stream `url` into the task's temp file and install it. Blocking; run on a
/// blocking thread. Emits progress events and exactly one terminal event.
pub fn run_transfer(
    registry: &Registry,
    task: &TaskHandle,
    url: &str,
    opts: &TransferOptions,
    events: &EventSink,
) -> Result<PathBuf, DownloadError> {
    let result = stream_and_install(task, url, opts, events);
    match &result {
        Ok(path) => {
            task.finish(TaskState::Completed);
            registry.retire(&task.id());
            tracing::info!(task = %task.id(), artifact = task.artifact_id(), path = %path.display(), "download complete");
            events.emit(DownloadEvent::complete(
                task.id(),
                task.artifact_id(),
                path.clone(),
            ));
        }
        Err(e) => {
            let terminal = if e.is_cancelled() {
                TaskState::Cancelled
            } else {
                TaskState::Failed
            };
            task.finish(terminal);
            registry.retire(&task.id());
            if e.is_cancelled() {
                tracing::info!(task = %task.id(), artifact = task.artifact_id(), "download cancelled");
            } else {
                tracing::warn!(task = %task.id(), artifact = task.artifact_id(), "download failed: {}", e);
            }
            events.emit(DownloadEvent::error(task.id(), task.artifact_id(), e));
        }
    }
    result
}

fn stream_and_install(
    task: &TaskHandle,
    url: &str,
    opts: &TransferOptions,
    events: &EventSink,
) -> Result<PathBuf, DownloadError> {
    if task.cancel_token().is_cancelled() {
        return Err(DownloadError::Cancelled);
    }
    let temp = task.temp_path();
    let writer =
        TempWriter::create(temp).map_err(|e| DownloadError::filesystem(temp, e))?;
    task.start();
    tracing::debug!(task = %task.id(), url, temp = %temp.display(), "downloading");

    let mut sink = TransferSink::new(task, writer, opts.progress_interval, events);
    let fetched = fetch::fetch(url, &opts.fetch, &mut sink);
    let summary = match fetched {
        Ok(summary) => summary,
        Err(e) => {
            drop(sink);
            discard_temp(task);
            return Err(DownloadError::from_fetch(e, temp));
        }
    };
    tracing::debug!(
        task = %task.id(),
        bytes = summary.bytes,
        redirects = summary.redirects,
        final_url = %summary.final_url,
        "stream ended"
    );

    sink.flush_progress();
    let installed = sink
        .into_writer()
        .finish()
        .and_then(|_| storage::install(temp, task.final_path()));
    if let Err(e) = installed {
        discard_temp(task);
        return Err(DownloadError::filesystem(task.final_path(), e));
    }
    Ok(task.final_path().to_path_buf())
}

fn discard_temp(task: &TaskHandle) {
    if let Err(e) = storage::discard(task.temp_path()) {
        tracing::warn!(task = %task.id(), path = %task.temp_path().display(), "could not remove temp file: {}", e);
    }
}

/// Run [`run_transfer`] on tokio's blocking pool.
pub async fn run_transfer_async(
    registry: Arc<Registry>,
    task: Arc<TaskHandle>,
    url: String,
    opts: TransferOptions,
    events: EventSink,
) -> Result<PathBuf, DownloadError> {
    let join = tokio::task::spawn_blocking(move || {
        run_transfer(&registry, &task, &url, &opts, &events)
    });
    match join.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(DownloadError::Cancelled),
    }
}
