//! Sequential writer for the `.part` file of one transfer.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

const WRITE_BUFFER: usize = 1 << 20;

/// Temp file being filled by a transfer. Call `finish` before installing.
pub struct TempWriter {
    file: BufWriter<File>,
    written: u64,
}

impl TempWriter {
    /// Create the temp file at `path`, truncating anything left there.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: BufWriter::with_capacity(WRITE_BUFFER, file),
            written: 0,
        })
    }

    /// Reserve `size` bytes up front so a full disk fails here rather than mid-stream.
    /// On Linux tries `posix_fallocate`, then falls back to `set_len`.
    pub fn preallocate(&mut self, size: u64) -> io::Result<()> {
        if size == 0 {
            return Ok(());
        }
        #[cfg(target_os = "linux")]
        {
            let fd = self.file.get_ref().as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            if r == libc::ENOSPC {
                return Err(io::Error::from_raw_os_error(r));
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file.get_ref().set_len(size)
    }

    pub fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Bytes written since creation.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush, trim any preallocated tail beyond the written length, and sync to disk.
    /// The file is closed when this returns.
    pub fn finish(mut self) -> io::Result<u64> {
        self.file.flush()?;
        let file = self.file.get_ref();
        if file.metadata()?.len() != self.written {
            file.set_len(self.written)?;
        }
        file.sync_all()?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_finish() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("m.gguf.part");
        let mut w = TempWriter::create(&p).unwrap();
        w.preallocate(100).unwrap();
        w.write_chunk(b"hello ").unwrap();
        w.write_chunk(b"world").unwrap();
        assert_eq!(w.written(), 11);
        assert_eq!(w.finish().unwrap(), 11);
        assert_eq!(std::fs::read(&p).unwrap(), b"hello world");
    }

    #[test]
    fn create_truncates_leftover() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("m.gguf.part");
        std::fs::write(&p, b"stale data from a crash").unwrap();
        let w = TempWriter::create(&p).unwrap();
        assert_eq!(w.finish().unwrap(), 0);
        assert_eq!(std::fs::metadata(&p).unwrap().len(), 0);
    }
}
