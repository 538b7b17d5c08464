pub mod config;
pub mod logging;

pub mod artifact;
pub mod disk;
pub mod error;
pub mod event;
pub mod fetch;
pub mod manager;
pub mod progress;
pub mod registry;
pub mod storage;
pub mod transfer;

pub use artifact::ArtifactDescriptor;
pub use error::{DownloadError, ErrorKind};
pub use event::DownloadEvent;
pub use manager::{DownloadHandle, DownloadManager};
pub use registry::{ActiveDownload, DownloadTask, TaskId, TaskState};
pub use transfer::TransferOptions;
