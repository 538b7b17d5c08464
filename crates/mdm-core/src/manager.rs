//! Public entry point: pre-flight checks, admission, and spawning transfers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::artifact::ArtifactDescriptor;
use crate::config::MdmConfig;
use crate::disk::{self, Capacity};
use crate::error::DownloadError;
use crate::event::{DownloadEvent, EventSink};
use crate::registry::{ActiveDownload, DownloadTask, Registry, TaskId, TaskState};
use crate::storage;
use crate::transfer::{self, TransferOptions};

/// Owns the registry and starts one tokio task per admitted download.
/// Must be used from within a tokio runtime.
pub struct DownloadManager {
    registry: Arc<Registry>,
    models_dir: RwLock<PathBuf>,
    options: TransferOptions,
    events: EventSink,
}

/// A started download. Dropping the handle does not stop the transfer; use
/// [`DownloadManager::cancel_download`] for that.
#[derive(Debug)]
pub struct DownloadHandle {
    task_id: TaskId,
    capacity: Capacity,
    join: JoinHandle<Result<PathBuf, DownloadError>>,
}

impl DownloadHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Free space found at pre-flight. A soft `Insufficient` or `Unknown` result
    /// did not stop the download; [`Capacity::warning`] has text for the user.
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Wait for the transfer to finish. Resolves to the installed path.
    pub async fn wait(self) -> Result<PathBuf, DownloadError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(DownloadError::Cancelled),
        }
    }
}

/// Retires the task when dropped. The transfer retires it itself before the
/// terminal event; this covers early returns and panics.
struct RetireGuard {
    registry: Arc<Registry>,
    task_id: TaskId,
}

impl Drop for RetireGuard {
    fn drop(&mut self) {
        self.registry.retire(&self.task_id);
    }
}

impl DownloadManager {
    pub fn new(models_dir: impl Into<PathBuf>, options: TransferOptions) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            models_dir: RwLock::new(models_dir.into()),
            options,
            events: EventSink::default(),
        }
    }

    /// Manager configured from `cfg` (models dir, timeouts, redirect limit).
    pub fn from_config(cfg: &MdmConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            cfg.resolved_models_dir()?,
            TransferOptions::from_config(cfg),
        ))
    }

    /// Send progress and terminal events to `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<DownloadEvent>) -> Self {
        self.events = EventSink::new(Some(tx));
        self
    }

    pub fn models_dir(&self) -> PathBuf {
        self.models_dir
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the destination for downloads started from now on.
    pub fn set_models_dir(&self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        tracing::info!(dir = %dir.display(), "models directory changed");
        *self
            .models_dir
            .write()
            .unwrap_or_else(PoisonError::into_inner) = dir;
    }

    /// True when the artifact's final file exists in the models directory.
    pub fn is_installed(&self, artifact: &ArtifactDescriptor) -> bool {
        artifact.final_path(&self.models_dir()).exists()
    }

    /// Run the pre-flight checks, admit the task, and start streaming in the background.
    ///
    /// Pre-flight failures (`AlreadyInstalled`, `AlreadyInProgress`, hard
    /// `InsufficientDiskSpace`, unusable models directory) are returned here and
    /// produce no event. A soft disk result is carried on the handle. Everything
    /// after admission is reported through the handle and the event channel.
    pub fn start_download(
        &self,
        artifact: &ArtifactDescriptor,
    ) -> Result<DownloadHandle, DownloadError> {
        let dir = self.models_dir();
        let final_path = artifact.final_path(&dir);
        let task = self.registry.admit(
            &artifact.id,
            storage::temp_path(&final_path),
            final_path,
        )?;
        let guard = RetireGuard {
            registry: Arc::clone(&self.registry),
            task_id: task.id(),
        };

        let capacity = match self.preflight(artifact, &dir) {
            Ok(capacity) => capacity,
            Err(e) => {
                task.finish(TaskState::Failed);
                drop(guard);
                return Err(e);
            }
        };

        tracing::info!(task = %task.id(), artifact = %artifact.id, url = %artifact.url, "download started");
        let task_id = task.id();
        let url = artifact.url.clone();
        let options = self.options;
        let events = self.events.clone();
        let registry = Arc::clone(&self.registry);
        let join = tokio::spawn(async move {
            let _guard = guard;
            transfer::run_transfer_async(registry, task, url, options, events).await
        });
        Ok(DownloadHandle {
            task_id,
            capacity,
            join,
        })
    }

    fn preflight(
        &self,
        artifact: &ArtifactDescriptor,
        dir: &Path,
    ) -> Result<Capacity, DownloadError> {
        std::fs::create_dir_all(dir).map_err(|e| DownloadError::filesystem(dir, e))?;
        let required = disk::required_bytes(artifact.size, artifact.size_margin);
        let capacity = disk::check_capacity(dir, required);
        tracing::debug!(artifact = %artifact.id, required, available = ?capacity.available(), "disk check");
        if capacity.is_insufficient() && self.options.require_disk_space {
            return Err(DownloadError::InsufficientDiskSpace {
                required,
                available: capacity.available().unwrap_or(0),
            });
        }
        if let Some(warning) = capacity.warning() {
            tracing::warn!(artifact = %artifact.id, dir = %dir.display(), "{}; continuing", warning);
        }
        Ok(capacity)
    }

    /// Start and wait.
    pub async fn download(&self, artifact: &ArtifactDescriptor) -> Result<PathBuf, DownloadError> {
        self.start_download(artifact)?.wait().await
    }

    /// Request cancellation of a running task. Takes effect on its next chunk.
    pub fn cancel_download(&self, task_id: &TaskId) -> Result<(), DownloadError> {
        self.registry.cancel(task_id)
    }

    /// Request cancellation of every live task.
    pub fn cancel_all(&self) {
        for active in self.registry.list() {
            // Tasks retiring concurrently may already be gone.
            let _ = self.registry.cancel(&active.task_id);
        }
    }

    pub fn list_active_downloads(&self) -> Vec<ActiveDownload> {
        self.registry.list()
    }

    pub fn lookup(&self, task_id: &TaskId) -> Result<DownloadTask, DownloadError> {
        self.registry.lookup(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn existing_final_file_is_already_installed() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ArtifactDescriptor::new("m", "http://127.0.0.1:9/m", 10);
        std::fs::write(artifact.final_path(dir.path()), b"done").unwrap();

        let mgr = DownloadManager::new(dir.path(), TransferOptions::default());
        let err = mgr.start_download(&artifact).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInstalled);
        assert!(mgr.list_active_downloads().is_empty());
        assert!(mgr.is_installed(&artifact));
    }

    #[tokio::test]
    async fn hard_disk_requirement_fails_preflight() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = ArtifactDescriptor::new("huge", "http://127.0.0.1:9/huge", u64::MAX / 2);
        artifact.size_margin = 1.5;
        let opts = TransferOptions {
            require_disk_space: true,
            ..TransferOptions::default()
        };
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mgr = DownloadManager::new(dir.path(), opts).with_events(tx);

        let err = mgr.start_download(&artifact).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientDiskSpace);
        assert!(err.is_preflight());
        assert!(mgr.list_active_downloads().is_empty());
        assert!(rx.try_recv().is_err());
        assert!(!storage::temp_path(&artifact.final_path(dir.path())).exists());
    }

    #[tokio::test]
    async fn soft_disk_shortfall_is_reported_on_handle() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ArtifactDescriptor::new("big", "http://127.0.0.1:9/big", u64::MAX / 2);
        let mgr = DownloadManager::new(dir.path(), TransferOptions::default());

        let handle = mgr.start_download(&artifact).unwrap();
        assert!(handle.capacity().is_insufficient());
        let warning = handle.capacity().warning().unwrap();
        assert!(warning.starts_with("low disk space"), "{}", warning);
        // Nothing listens on the discard port; the transfer itself fails.
        assert!(handle.wait().await.is_err());
    }

    #[tokio::test]
    async fn set_models_dir_applies_to_new_downloads() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let artifact = ArtifactDescriptor::new("m", "http://127.0.0.1:9/m", 1);
        std::fs::write(artifact.final_path(b.path()), b"x").unwrap();

        let mgr = DownloadManager::new(a.path(), TransferOptions::default());
        assert!(!mgr.is_installed(&artifact));
        mgr.set_models_dir(b.path());
        assert_eq!(mgr.models_dir(), b.path());
        assert_eq!(
            mgr.start_download(&artifact).unwrap_err().kind(),
            ErrorKind::AlreadyInstalled
        );
    }

    #[tokio::test]
    async fn cancel_unknown_task_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = DownloadManager::new(dir.path(), TransferOptions::default());
        let id = TaskId::new();
        assert_eq!(mgr.cancel_download(&id).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(mgr.lookup(&id).unwrap_err().kind(), ErrorKind::NotFound);
    }
}
