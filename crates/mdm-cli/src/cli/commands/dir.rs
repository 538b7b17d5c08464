//! `mdm dir [PATH]` – show or change the models directory.

use anyhow::{Context, Result};
use mdm_core::config::{self, MdmConfig};
use std::path::PathBuf;

pub fn run_dir(mut cfg: MdmConfig, path: Option<PathBuf>) -> Result<()> {
    match path {
        None => println!("{}", cfg.resolved_models_dir()?.display()),
        Some(path) => {
            let path = if path.is_absolute() {
                path
            } else {
                std::env::current_dir()
                    .context("resolve current directory")?
                    .join(path)
            };
            cfg.models_dir = Some(path.clone());
            config::save(&cfg)?;
            tracing::info!(dir = %path.display(), "models directory saved");
            println!("Models directory set to {}", path.display());
        }
    }
    Ok(())
}
