//! Control socket: server (during `mdm download`) and client (`mdm active`, `mdm cancel`).
//! Protocol: one line per request, one line per reply.
//! - `list` → JSON array of active downloads
//! - `cancel <task-id>` → `ok` or `error <message>`

use anyhow::{bail, Context, Result};
use mdm_core::{ActiveDownload, DownloadManager, TaskId};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    List,
    Cancel(TaskId),
}

/// Parse one request line. Malformed lines yield `None`.
pub fn parse_request(line: &str) -> Option<ControlRequest> {
    let line = line.trim();
    if line == "list" {
        return Some(ControlRequest::List);
    }
    let id = line.strip_prefix("cancel ")?;
    id.trim().parse::<TaskId>().ok().map(ControlRequest::Cancel)
}

fn handle_request(manager: &DownloadManager, line: &str) -> String {
    match parse_request(line) {
        Some(ControlRequest::List) => serde_json::to_string(&manager.list_active_downloads())
            .unwrap_or_else(|e| format!("error {}", e)),
        Some(ControlRequest::Cancel(id)) => match manager.cancel_download(&id) {
            Ok(()) => "ok".to_string(),
            Err(e) => format!("error {}", e),
        },
        None => "error unknown command".to_string(),
    }
}

/// Spawns a task that listens on `path` and answers requests against `manager`.
/// A stale socket file at `path` is replaced.
pub fn spawn_control_listener(
    manager: Arc<DownloadManager>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create {}", dir.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let manager = Arc::clone(&manager);
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut lines = BufReader::new(read).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            let mut reply = handle_request(&manager, &line);
                            reply.push('\n');
                            if write.write_all(reply.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Send one request line and read the reply. `None` when no downloader is
/// listening (socket missing or stale).
pub async fn request(socket_path: &Path, line: &str) -> Result<Option<String>> {
    if !socket_path.exists() {
        return Ok(None);
    }
    let stream = match UnixStream::connect(socket_path).await {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!(path = %socket_path.display(), "control socket connect: {}", e);
            return Ok(None);
        }
    };
    let (read, mut write) = stream.into_split();
    write.write_all(format!("{}\n", line).as_bytes()).await?;
    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .context("control socket closed without reply")?;
    Ok(Some(reply))
}

/// Active downloads of the running downloader, `None` if none is running.
pub async fn query_active(socket_path: &Path) -> Result<Option<Vec<ActiveDownload>>> {
    match request(socket_path, "list").await? {
        Some(reply) => {
            let active = serde_json::from_str(&reply)
                .with_context(|| format!("unexpected reply: {}", reply))?;
            Ok(Some(active))
        }
        None => Ok(None),
    }
}

/// Ask the running downloader to cancel `task_id`.
pub async fn send_cancel(socket_path: &Path, task_id: TaskId) -> Result<()> {
    match request(socket_path, &format!("cancel {}", task_id)).await? {
        Some(reply) if reply == "ok" => Ok(()),
        Some(reply) => bail!("{}", reply.strip_prefix("error ").unwrap_or(&reply)),
        None => bail!("no download is running"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdm_core::TransferOptions;

    #[test]
    fn parse_control_lines() {
        let id = TaskId::new();
        assert_eq!(parse_request("list\n"), Some(ControlRequest::List));
        assert_eq!(
            parse_request(&format!("cancel {}", id)),
            Some(ControlRequest::Cancel(id))
        );
        assert_eq!(parse_request("cancel 42"), None);
        assert_eq!(parse_request("pause"), None);
    }

    #[tokio::test]
    async fn listener_answers_list_and_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("control.sock");
        let manager = Arc::new(DownloadManager::new(dir.path(), TransferOptions::default()));
        let handle = spawn_control_listener(Arc::clone(&manager), &sock).unwrap();

        let active = query_active(&sock).await.unwrap().unwrap();
        assert!(active.is_empty());
        let err = send_cancel(&sock, TaskId::new()).await.unwrap_err();
        assert!(err.to_string().contains("no active download"));

        handle.abort();
    }

    #[tokio::test]
    async fn missing_socket_means_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("none.sock");
        assert!(query_active(&sock).await.unwrap().is_none());
        assert!(send_cancel(&sock, TaskId::new()).await.is_err());
    }
}
