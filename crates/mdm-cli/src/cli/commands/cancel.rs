//! `mdm cancel <task-id>` – signal a running `mdm download` to stop one task.

use anyhow::{Context, Result};
use mdm_core::{config, TaskId};

use crate::cli::control_socket;

pub async fn run_cancel(task_id: &str) -> Result<()> {
    let id: TaskId = task_id
        .parse()
        .with_context(|| format!("invalid task id {:?}", task_id))?;
    let path = config::control_socket_path()?;
    control_socket::send_cancel(&path, id).await?;
    println!("Cancel requested for {id}");
    Ok(())
}
