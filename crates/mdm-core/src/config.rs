use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::ArtifactDescriptor;

/// Global configuration loaded from `~/.config/mdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdmConfig {
    /// Destination directory for installed artifacts. `None` = `~/.local/share/mdm/models`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_dir: Option<PathBuf>,
    /// Refuse to start when free space is known to be below the required amount.
    /// Off by default: free-space figures are advisory and a write error is the real signal.
    #[serde(default)]
    pub require_disk_space: bool,
    /// Maximum number of redirect hops followed per download.
    pub max_redirects: u32,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Abort when no bytes arrive for this many seconds.
    pub idle_timeout_secs: u64,
    /// Minimum interval between progress events for one task, in milliseconds.
    pub progress_interval_ms: u64,
    /// Catalog of downloadable artifacts.
    #[serde(default)]
    pub artifacts: Vec<ArtifactDescriptor>,
}

impl Default for MdmConfig {
    fn default() -> Self {
        Self {
            models_dir: None,
            require_disk_space: false,
            max_redirects: 10,
            connect_timeout_secs: 30,
            idle_timeout_secs: 30,
            progress_interval_ms: 1000,
            artifacts: Vec::new(),
        }
    }
}

impl MdmConfig {
    /// Look up a catalog entry by artifact id.
    pub fn artifact(&self, id: &str) -> Option<&ArtifactDescriptor> {
        self.artifacts.iter().find(|a| a.id == id)
    }

    /// Configured models directory, or the XDG data default.
    pub fn resolved_models_dir(&self) -> Result<PathBuf> {
        match &self.models_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_models_dir(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// `~/.local/share/mdm/models`.
pub fn default_models_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mdm")?;
    Ok(xdg_dirs.get_data_home().join("models"))
}

/// Control socket of a running `mdm download` (same XDG state dir as the log).
pub fn control_socket_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mdm")?;
    Ok(xdg_dirs.get_state_home().join("control.sock"))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MdmConfig::default();
        save_to(&path, &default_cfg)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<MdmConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: MdmConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}

/// Write the configuration back to the default location.
pub fn save(cfg: &MdmConfig) -> Result<()> {
    save_to(&config_path()?, cfg)
}

pub fn save_to(path: &Path, cfg: &MdmConfig) -> Result<()> {
    let toml = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml).with_context(|| format!("write config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = MdmConfig::default();
        assert!(cfg.models_dir.is_none());
        assert!(!cfg.require_disk_space);
        assert_eq!(cfg.max_redirects, 10);
        assert_eq!(cfg.connect_timeout_secs, 30);
        assert_eq!(cfg.idle_timeout_secs, 30);
        assert_eq!(cfg.progress_interval_ms, 1000);
        assert!(cfg.artifacts.is_empty());
    }

    #[test]
    fn config_toml_roundtrip() {
        let mut cfg = MdmConfig::default();
        cfg.models_dir = Some(PathBuf::from("/srv/models"));
        cfg.artifacts
            .push(ArtifactDescriptor::new("m", "https://example.com/m.gguf", 42));
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: MdmConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.models_dir, cfg.models_dir);
        assert_eq!(parsed.max_redirects, cfg.max_redirects);
        assert_eq!(parsed.artifacts, cfg.artifacts);
    }

    #[test]
    fn config_toml_catalog() {
        let toml = r#"
            require_disk_space = true
            max_redirects = 3
            connect_timeout_secs = 5
            idle_timeout_secs = 10
            progress_interval_ms = 250

            [[artifacts]]
            id = "qwen-0.5b"
            name = "Qwen 0.5B"
            url = "https://huggingface.co/q/resolve/main/q.gguf"
            size = 400000000

            [[artifacts]]
            id = "llama-1b"
            url = "https://huggingface.co/l/resolve/main/l.gguf"
            size = 800000000
            size_margin = 1.5
        "#;
        let cfg: MdmConfig = toml::from_str(toml).unwrap();
        assert!(cfg.require_disk_space);
        assert_eq!(cfg.max_redirects, 3);
        assert_eq!(cfg.progress_interval_ms, 250);
        assert_eq!(cfg.artifacts.len(), 2);
        let qwen = cfg.artifact("qwen-0.5b").unwrap();
        assert_eq!(qwen.label(), "Qwen 0.5B");
        assert!((cfg.artifact("llama-1b").unwrap().size_margin - 1.5).abs() < 1e-9);
        assert!(cfg.artifact("missing").is_none());
    }

    #[test]
    fn save_and_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = MdmConfig::default();
        cfg.models_dir = Some(dir.path().join("models"));
        save_to(&path, &cfg).unwrap();
        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded.models_dir, cfg.models_dir);
        assert_eq!(
            loaded.resolved_models_dir().unwrap(),
            dir.path().join("models")
        );
    }
}
