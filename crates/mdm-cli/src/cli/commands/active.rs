//! `mdm active` – list tasks of a running `mdm download`.

use anyhow::Result;
use mdm_core::config;

use crate::cli::control_socket;

pub async fn run_active() -> Result<()> {
    let path = config::control_socket_path()?;
    match control_socket::query_active(&path).await? {
        Some(active) if !active.is_empty() => {
            println!("{:<38} {:<12} {}", "TASK", "STATE", "ARTIFACT");
            for a in active {
                println!("{:<38} {:<12} {}", a.task_id, a.state, a.artifact_id);
            }
        }
        _ => println!("No active downloads."),
    }
    Ok(())
}
