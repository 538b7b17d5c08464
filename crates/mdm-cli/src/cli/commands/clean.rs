//! `mdm clean` – delete `.part` files left behind by interrupted downloads.

use anyhow::{bail, Context, Result};
use mdm_core::config::{self, MdmConfig};
use mdm_core::progress::format_bytes;
use mdm_core::storage;

use crate::cli::control_socket;

pub async fn run_clean(cfg: &MdmConfig) -> Result<()> {
    let socket = config::control_socket_path()?;
    if control_socket::query_active(&socket).await?.is_some() {
        bail!("a download is running; stop it before cleaning");
    }

    let dir = cfg.resolved_models_dir()?;
    let orphans = storage::find_orphans(&dir)
        .with_context(|| format!("scan {}", dir.display()))?;
    if orphans.is_empty() {
        println!("Nothing to clean in {}", dir.display());
        return Ok(());
    }
    let mut freed = 0u64;
    for path in &orphans {
        let len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        storage::discard(path).with_context(|| format!("remove {}", path.display()))?;
        freed += len;
        println!("removed {}", path.display());
    }
    println!("Removed {} file(s), freed {}", orphans.len(), format_bytes(freed));
    Ok(())
}
