//! In-memory table of in-flight downloads with per-task cancel tokens.
//!
//! The manager admits a task before any work starts and retires it once the task
//! reaches a terminal state. A control client (e.g. `mdm cancel <id>` via the
//! socket) only flips the task's cancel token; the streaming loop sees the token
//! on the next chunk and stops.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::DownloadError;

/// Identifier of one download attempt. Distinct from the artifact id: retrying an
/// artifact yields a new task id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(uuid::Uuid);

impl TaskId {
    pub fn new() -> Self {
        TaskId(uuid::Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s.trim()).map(TaskId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Downloading,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Downloading => "downloading",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
            TaskState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed
        )
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => TaskState::Queued,
            1 => TaskState::Downloading,
            2 => TaskState::Completed,
            3 => TaskState::Cancelled,
            _ => TaskState::Failed,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared cooperative cancel flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Live task record shared between the registry and the transfer running it.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    artifact_id: String,
    temp_path: PathBuf,
    final_path: PathBuf,
    state: AtomicU8,
    bytes: AtomicU64,
    total: AtomicU64,
    cancel: CancelToken,
}

impl TaskHandle {
    fn new(artifact_id: &str, temp_path: PathBuf, final_path: PathBuf) -> Self {
        Self {
            id: TaskId::new(),
            artifact_id: artifact_id.to_string(),
            temp_path,
            final_path,
            state: AtomicU8::new(TaskState::Queued as u8),
            bytes: AtomicU64::new(0),
            total: AtomicU64::new(0),
            cancel: CancelToken::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// `queued → downloading`. False if the task already left `queued`.
    pub fn start(&self) -> bool {
        self.state
            .compare_exchange(
                TaskState::Queued as u8,
                TaskState::Downloading as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Enter a terminal state. Only the first call succeeds; later calls return false
    /// and leave the state untouched.
    pub fn finish(&self, terminal: TaskState) -> bool {
        debug_assert!(terminal.is_terminal());
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if TaskState::from_u8(current).is_terminal() {
                return false;
            }
            match self.state.compare_exchange(
                current,
                terminal as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Record progress counters. Ignored once the task is terminal.
    pub fn record_progress(&self, bytes: u64, total: u64) {
        if self.state().is_terminal() {
            return;
        }
        self.bytes.store(bytes, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DownloadTask {
        DownloadTask {
            task_id: self.id,
            artifact_id: self.artifact_id.clone(),
            state: self.state(),
            bytes: self.bytes.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            temp_path: self.temp_path.clone(),
            final_path: self.final_path.clone(),
            cancel_requested: self.cancel.is_cancelled(),
        }
    }
}

/// Point-in-time copy of a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadTask {
    pub task_id: TaskId,
    pub artifact_id: String,
    pub state: TaskState,
    pub bytes: u64,
    /// Declared by the server; 0 while unknown.
    pub total: u64,
    pub temp_path: PathBuf,
    pub final_path: PathBuf,
    pub cancel_requested: bool,
}

/// Entry of [`Registry::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveDownload {
    pub task_id: TaskId,
    pub artifact_id: String,
    pub state: TaskState,
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<TaskId, Arc<TaskHandle>>,
    by_artifact: HashMap<String, TaskId>,
    by_path: HashMap<PathBuf, TaskId>,
}

/// All indices live behind one lock, so admission and retirement are atomic.
/// Distinct artifact ids may sanitize to the same file name; the path index keeps
/// two live tasks from sharing one temp file.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new task for `artifact_id` in state `queued`.
    ///
    /// Fails with `AlreadyInProgress` while another task for the same artifact or
    /// the same final path is live, and with `AlreadyInstalled` when `final_path`
    /// exists. Both checks run under the registry lock, so a task that installs
    /// and retires concurrently is seen either as live or as installed.
    pub fn admit(
        &self,
        artifact_id: &str,
        temp_path: PathBuf,
        final_path: PathBuf,
    ) -> Result<Arc<TaskHandle>, DownloadError> {
        let mut inner = self.lock();
        let existing = inner
            .by_artifact
            .get(artifact_id)
            .or_else(|| inner.by_path.get(&final_path));
        if let Some(existing) = existing {
            return Err(DownloadError::AlreadyInProgress {
                artifact_id: artifact_id.to_string(),
                task_id: *existing,
            });
        }
        if final_path.exists() {
            return Err(DownloadError::AlreadyInstalled {
                artifact_id: artifact_id.to_string(),
                path: final_path,
            });
        }
        let task = Arc::new(TaskHandle::new(artifact_id, temp_path, final_path));
        inner.by_artifact.insert(artifact_id.to_string(), task.id());
        inner.by_path.insert(task.final_path().to_path_buf(), task.id());
        inner.tasks.insert(task.id(), Arc::clone(&task));
        tracing::debug!(task = %task.id(), artifact = artifact_id, "admitted");
        Ok(task)
    }

    pub fn lookup(&self, task_id: &TaskId) -> Result<DownloadTask, DownloadError> {
        self.lock()
            .tasks
            .get(task_id)
            .map(|t| t.snapshot())
            .ok_or(DownloadError::NotFound(*task_id))
    }

    /// Request cancellation. Only sets the flag; the transfer notices it on its
    /// next chunk. Unknown or already retired ids are `NotFound`.
    pub fn cancel(&self, task_id: &TaskId) -> Result<(), DownloadError> {
        let inner = self.lock();
        let task = inner
            .tasks
            .get(task_id)
            .ok_or(DownloadError::NotFound(*task_id))?;
        task.cancel_token().cancel();
        tracing::info!(task = %task_id, artifact = task.artifact_id(), "cancel requested");
        Ok(())
    }

    /// Remove a task from every index. Unknown ids are ignored.
    pub fn retire(&self, task_id: &TaskId) {
        let mut inner = self.lock();
        if let Some(task) = inner.tasks.remove(task_id) {
            if inner.by_artifact.get(task.artifact_id()) == Some(task_id) {
                inner.by_artifact.remove(task.artifact_id());
            }
            if inner.by_path.get(task.final_path()) == Some(task_id) {
                inner.by_path.remove(task.final_path());
            }
            tracing::debug!(task = %task_id, state = %task.state(), "retired");
        }
    }

    /// Active tasks, ordered by artifact id.
    pub fn list(&self) -> Vec<ActiveDownload> {
        let inner = self.lock();
        let mut out: Vec<ActiveDownload> = inner
            .tasks
            .values()
            .map(|t| ActiveDownload {
                task_id: t.id(),
                artifact_id: t.artifact_id().to_string(),
                state: t.state(),
            })
            .collect();
        out.sort_by(|a, b| a.artifact_id.cmp(&b.artifact_id));
        out
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
