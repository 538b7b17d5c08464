//! `mdm list` – show the catalog and which artifacts are installed.

use anyhow::Result;
use mdm_core::config::MdmConfig;
use mdm_core::progress::format_bytes;

pub fn run_list(cfg: &MdmConfig) -> Result<()> {
    if cfg.artifacts.is_empty() {
        println!("No artifacts in catalog. Add [[artifacts]] entries to the config file.");
        return Ok(());
    }
    let dir = cfg.resolved_models_dir()?;
    println!("{:<32} {:<12} {:<10} {}", "ID", "SIZE", "STATUS", "NAME");
    for a in &cfg.artifacts {
        let status = if a.final_path(&dir).exists() {
            "installed"
        } else {
            "-"
        };
        println!(
            "{:<32} {:<12} {:<10} {}",
            a.id,
            format_bytes(a.size),
            status,
            a.label()
        );
    }
    Ok(())
}
