//! Temp file lifecycle and atomic install.
//!
//! A transfer writes to `<final>.part` and only a single rename makes the
//! artifact visible under its final name. Leftover `.part` files after a crash
//! are recognizable and can be listed with [`find_orphans`].

mod writer;

pub use writer::TempWriter;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `m.gguf` → `m.gguf.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Rename `temp` onto `final_path` in one step.
///
/// Never replaces an existing final file: in that case the error is
/// `AlreadyExists` and `temp` is left in place. Both paths must be on the same
/// filesystem.
pub fn install(temp: &Path, final_path: &Path) -> io::Result<()> {
    if final_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", final_path.display()),
        ));
    }
    fs::rename(temp, final_path)?;
    tracing::debug!(from = %temp.display(), to = %final_path.display(), "installed");
    Ok(())
}

/// Remove a temp file. A file that is already gone is not an error.
pub fn discard(temp: &Path) -> io::Result<()> {
    match fs::remove_file(temp) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// `.part` files directly inside `dir`, sorted by path. A missing directory has none.
pub fn find_orphans(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut orphans = Vec::new();
    for entry in entries {
        let entry = entry?;
        let is_part = entry
            .file_name()
            .to_str()
            .map(|n| n.ends_with(TEMP_SUFFIX) && n.len() > TEMP_SUFFIX.len())
            .unwrap_or(false);
        if is_part && entry.file_type()?.is_file() {
            orphans.push(entry.path());
        }
    }
    orphans.sort();
    Ok(orphans)
}
