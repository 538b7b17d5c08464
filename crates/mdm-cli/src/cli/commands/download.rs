//! `mdm download <ID>...` – download artifacts concurrently and report progress.
//!
//! While running, serves the control socket so `mdm active` / `mdm cancel` work
//! from another terminal. Ctrl-C cancels every active task.

use anyhow::{bail, Result};
use mdm_core::config::{self, MdmConfig};
use mdm_core::disk::Capacity;
use mdm_core::progress::format_bytes;
use mdm_core::{
    ArtifactDescriptor, DownloadError, DownloadEvent, DownloadHandle, DownloadManager, ErrorKind,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::control_socket;

pub async fn run_download(cfg: &MdmConfig, ids: &[String], json: bool) -> Result<()> {
    let mut artifacts: Vec<&ArtifactDescriptor> = Vec::with_capacity(ids.len());
    for id in ids {
        match cfg.artifact(id) {
            Some(a) => artifacts.push(a),
            None => bail!("unknown artifact {:?} (see `mdm list`)", id),
        }
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let manager = Arc::new(DownloadManager::from_config(cfg)?.with_events(tx));

    let socket_path = config::control_socket_path().ok();
    let listener = socket_path.as_ref().and_then(|p| {
        match control_socket::spawn_control_listener(Arc::clone(&manager), p) {
            Ok(h) => {
                tracing::debug!(path = %p.display(), "control socket listening");
                Some(h)
            }
            Err(e) => {
                tracing::warn!("control socket unavailable: {:#}", e);
                None
            }
        }
    });

    let mut failed = 0usize;
    let mut handles: Vec<(String, DownloadHandle)> = Vec::new();
    for a in artifacts {
        match manager.start_download(a) {
            Ok(h) => {
                if !json {
                    println!("{}: started (task {})", a.id, h.task_id());
                }
                // stderr keeps `--json` stdout machine-readable.
                if let Some(line) = disk_advisory(&a.id, h.capacity()) {
                    eprintln!("{}", line);
                }
                handles.push((a.id.clone(), h));
            }
            Err(e) if e.kind() == ErrorKind::AlreadyInstalled => {
                if !json {
                    println!("{}: already installed", a.id);
                }
            }
            Err(e) => {
                eprintln!("{}: {}", a.id, e);
                failed += 1;
            }
        }
    }

    let ctrl_c = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("cancelling...");
                manager.cancel_all();
            }
        })
    };

    let mut waiter = tokio::spawn(async move {
        let mut results: Vec<(String, Result<PathBuf, DownloadError>)> = Vec::new();
        for (id, h) in handles {
            results.push((id, h.wait().await));
        }
        results
    });

    let results = loop {
        tokio::select! {
            Some(ev) = rx.recv() => print_event(&ev, json),
            joined = &mut waiter => break joined?,
        }
    };
    // Terminal events are sent before each task resolves; print what is left.
    while let Ok(ev) = rx.try_recv() {
        print_event(&ev, json);
    }

    ctrl_c.abort();
    if let Some(h) = listener {
        h.abort();
    }
    if let Some(p) = &socket_path {
        let _ = std::fs::remove_file(p);
    }

    let mut cancelled = 0usize;
    for (id, result) in results {
        match result {
            Ok(path) => tracing::info!(artifact = %id, path = %path.display(), "installed"),
            Err(e) if e.is_cancelled() => cancelled += 1,
            Err(e) => {
                tracing::warn!(artifact = %id, "download failed: {}", e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} download(s) failed", failed);
    }
    if cancelled > 0 && !json {
        println!("{} download(s) cancelled", cancelled);
    }
    Ok(())
}

fn disk_advisory(id: &str, capacity: Capacity) -> Option<String> {
    capacity
        .warning()
        .map(|w| format!("{}: warning: {} (continuing)", id, w))
}

fn print_event(ev: &DownloadEvent, json: bool) {
    if json {
        match serde_json::to_string(ev) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("serialize event: {}", e),
        }
        return;
    }
    println!("{}", render_event(ev));
}

fn render_event(ev: &DownloadEvent) -> String {
    match ev {
        DownloadEvent::Progress {
            artifact_id,
            bytes,
            total,
            percentage,
            bytes_per_sec,
            eta_secs,
            ..
        } => {
            let done = match percentage {
                Some(p) => format!(
                    "{} / {} ({:.1}%)",
                    format_bytes(*bytes),
                    format_bytes(*total),
                    p
                ),
                None => format_bytes(*bytes),
            };
            let eta = eta_secs
                .map(|s| format!("{:.0}s", s))
                .unwrap_or_else(|| "?".to_string());
            format!(
                "{}: {}  {}/s  ETA {}",
                artifact_id,
                done,
                format_bytes(*bytes_per_sec as u64),
                eta
            )
        }
        DownloadEvent::Complete {
            artifact_id,
            final_path,
            ..
        } => format!("{}: installed at {}", artifact_id, final_path.display()),
        DownloadEvent::Error {
            artifact_id,
            kind,
            message,
            ..
        } => match kind {
            ErrorKind::Cancelled => format!("{}: cancelled", artifact_id),
            _ => format!("{}: failed: {}", artifact_id, message),
        },
    }
}
