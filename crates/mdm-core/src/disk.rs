//! Pre-flight free space check for the destination volume.
//!
//! The check is advisory: an `Unknown` or `Insufficient` result is reported on the
//! download handle and the download goes ahead unless the host opted into
//! `require_disk_space`. A write error during streaming is the authoritative signal.

use std::io;
use std::path::Path;

use crate::progress::format_bytes;

/// Outcome of comparing required bytes against free space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Sufficient { available: u64 },
    Insufficient { required: u64, available: u64 },
    /// The free-space query failed or is unsupported on this platform.
    Unknown,
}

impl Capacity {
    pub fn available(&self) -> Option<u64> {
        match *self {
            Capacity::Sufficient { available } | Capacity::Insufficient { available, .. } => {
                Some(available)
            }
            Capacity::Unknown => None,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, Capacity::Insufficient { .. })
    }

    /// Text for the host when the download proceeds without a clean check.
    pub fn warning(&self) -> Option<String> {
        match *self {
            Capacity::Sufficient { .. } => None,
            Capacity::Insufficient {
                required,
                available,
            } => Some(format!(
                "low disk space: need {}, have {}",
                format_bytes(required),
                format_bytes(available)
            )),
            Capacity::Unknown => Some("free space unknown".to_string()),
        }
    }
}

/// Space to reserve for an artifact: `size * margin`, rounded up.
pub fn required_bytes(size: u64, margin: f64) -> u64 {
    let margin = if margin.is_finite() && margin >= 1.0 {
        margin
    } else {
        1.0
    };
    let required = (size as f64 * margin).ceil();
    if required >= u64::MAX as f64 {
        u64::MAX
    } else {
        required as u64
    }
}

/// Compare `required` against the free space of the volume holding `dir`.
pub fn check_capacity(dir: &Path, required: u64) -> Capacity {
    match available_space(dir) {
        Ok(available) if available >= required => Capacity::Sufficient { available },
        Ok(available) => Capacity::Insufficient {
            required,
            available,
        },
        Err(e) => {
            tracing::debug!(dir = %dir.display(), "free space query failed: {}", e);
            Capacity::Unknown
        }
    }
}

/// Bytes available to unprivileged users on the volume holding `path`.
/// Walks up to the nearest existing ancestor when `path` does not exist yet.
#[cfg(unix)]
pub fn available_space(path: &Path) -> io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let probe = path
        .ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .unwrap_or_else(|| Path::new("."));
    let c_path = CString::new(probe.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let r = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if r != 0 {
        return Err(io::Error::last_os_error());
    }
    #[allow(clippy::unnecessary_cast)]
    let available = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
    Ok(available)
}

#[cfg(not(unix))]
pub fn available_space(_path: &Path) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "free space query not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_bytes_applies_margin() {
        assert_eq!(required_bytes(1000, 1.2), 1200);
        assert_eq!(required_bytes(1001, 1.2), 1202);
        assert_eq!(required_bytes(0, 1.2), 0);
    }

    #[test]
    fn required_bytes_ignores_bogus_margin() {
        assert_eq!(required_bytes(1000, 0.5), 1000);
        assert_eq!(required_bytes(1000, f64::NAN), 1000);
        assert_eq!(required_bytes(u64::MAX, 2.0), u64::MAX);
    }

    #[cfg(unix)]
    #[test]
    fn check_capacity_on_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        match check_capacity(dir.path(), 1) {
            Capacity::Sufficient { available } => assert!(available >= 1),
            other => panic!("expected sufficient, got {:?}", other),
        }
        match check_capacity(dir.path(), u64::MAX) {
            Capacity::Insufficient { required, .. } => assert_eq!(required, u64::MAX),
            other => panic!("expected insufficient, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn missing_dir_uses_existing_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        assert!(available_space(&nested).is_ok());
    }

    #[test]
    fn capacity_accessors() {
        assert_eq!(Capacity::Unknown.available(), None);
        let c = Capacity::Insufficient {
            required: 10,
            available: 5,
        };
        assert!(c.is_insufficient());
        assert_eq!(c.available(), Some(5));
    }

    #[test]
    fn warning_only_for_soft_results() {
        assert_eq!(Capacity::Sufficient { available: 1 }.warning(), None);
        assert_eq!(
            Capacity::Unknown.warning().as_deref(),
            Some("free space unknown")
        );
        let c = Capacity::Insufficient {
            required: 2048,
            available: 1024,
        };
        assert_eq!(
            c.warning().as_deref(),
            Some("low disk space: need 2 KB, have 1 KB")
        );
    }
}
