//! Artifact descriptors from the catalog and the local file names derived from them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Extension appended to the artifact id when the catalog gives no explicit file name.
pub const DEFAULT_EXTENSION: &str = "gguf";

/// Safety factor applied to the declared size when checking free space.
pub const DEFAULT_SIZE_MARGIN: f64 = 1.2;

fn default_size_margin() -> f64 {
    DEFAULT_SIZE_MARGIN
}

/// A downloadable artifact as listed in the catalog. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Stable unique identifier (e.g. `qwen2.5-0.5b-instruct-q4`).
    pub id: String,
    /// Source URL (HTTPS in practice; redirects are followed).
    pub url: String,
    /// Declared size in bytes. May be approximate.
    pub size: u64,
    /// Multiplier applied to `size` for the free-space check.
    #[serde(default = "default_size_margin")]
    pub size_margin: f64,
    /// Display name for listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Installed file name; defaults to `<id>.gguf`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl ArtifactDescriptor {
    pub fn new(id: impl Into<String>, url: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            size,
            size_margin: DEFAULT_SIZE_MARGIN,
            name: None,
            description: None,
            file_name: None,
        }
    }

    /// File name the artifact is installed under, sanitized for the local filesystem.
    pub fn local_file_name(&self) -> String {
        let raw = match &self.file_name {
            Some(name) => name.clone(),
            None => format!("{}.{}", self.id, DEFAULT_EXTENSION),
        };
        let sanitized = sanitize_file_name(&raw);
        if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
            format!("artifact.{}", DEFAULT_EXTENSION)
        } else {
            sanitized
        }
    }

    /// Final install path inside `dir`.
    pub fn final_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.local_file_name())
    }

    /// Human-facing label: the catalog name if present, else the id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Sanitizes a candidate file name so it stays a single path component.
///
/// - Replaces NUL, `/`, `\`, whitespace and control characters with `_`
/// - Collapses consecutive underscores
/// - Trims leading/trailing dots and underscores
/// - Limits length to 255 bytes (NAME_MAX)
pub fn sanitize_file_name(name: &str) -> String {
    const NAME_MAX: usize = 255;

    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let unsafe_char = c == '\0' || c == '/' || c == '\\' || c.is_control() || c.is_whitespace();
        if unsafe_char || c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');

    if trimmed.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}
