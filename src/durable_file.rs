use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::Path;

use tracing::{debug, warn};

/// A buffered writer over one open log file.
///
/// Small writes are batched in a fixed-capacity in-memory buffer. A write that
/// doesn't fit pushes the buffer out to the OS first and then goes straight to
/// the handle without being re-buffered. Every [`flush`](DurableFile::flush)
/// ends with a data-sync, and dropping the file flushes it, so a rotation or a
/// shutdown always leaves the data on disk.
///
/// # Examples
///
/// ```
/// # use redirect_logger::DurableFile;
/// # let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("app.0.log");
/// let mut file = DurableFile::open(&path, 4096, false).unwrap();
/// file.write(b"hello\n").unwrap();
/// drop(file);
/// assert_eq!(std::fs::read(&path).unwrap(), b"hello\n");
/// ```
pub struct DurableFile {
    file: File,
    buf: Vec<u8>,
    capacity: usize,
    fallback: bool,
}

impl DurableFile {
    /// Opens (or creates) `path` for writing behind a `capacity`-byte buffer.
    ///
    /// With `append` the existing contents are kept, otherwise the file is
    /// truncated. If the path can't be opened the writer falls back to a
    /// duplicate of the process's standard output, so an unwritable log
    /// directory degrades output instead of killing the process.
    ///
    /// If standard output is itself redirected into a logger, the fallback
    /// writes land in that logger's own pipe and loop back into the log. A
    /// warning is emitted when the fallback turns out to be a pipe.
    ///
    /// # Errors
    ///
    /// Only fails when the fallback itself can't be set up.
    pub fn open(path: &Path, capacity: usize, append: bool) -> io::Result<Self> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).mode(0o644);
        if append {
            options.append(true);
        } else {
            options.truncate(true);
        }

        match options.open(path) {
            Ok(file) => Ok(Self::from_file(file, capacity)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "fallback to stdout: open failed");
                let stdout = File::from(io::stdout().as_fd().try_clone_to_owned()?);
                if is_pipe(&stdout) {
                    warn!("stdout is a pipe, fallback output may loop back into a redirected log");
                }
                let mut file = Self::from_file(stdout, capacity);
                file.fallback = true;
                Ok(file)
            }
        }
    }

    /// Wraps an already open handle.
    pub fn from_file(file: File, capacity: usize) -> Self {
        Self {
            file,
            buf: Vec::with_capacity(capacity),
            capacity,
            fallback: false,
        }
    }

    /// Appends `bytes`, spilling the buffer to the OS when they don't fit.
    ///
    /// Nothing is retried. On failure the spilled buffer contents are
    /// discarded, so the buffer never grows past its capacity.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.buf.len() + bytes.len() <= self.capacity {
            self.buf.extend_from_slice(bytes);
            return Ok(());
        }

        self.write_buffered()?;
        if !bytes.is_empty() {
            self.file.write_all(bytes)?;
        }
        Ok(())
    }

    /// Hands buffered bytes to the OS and forces them to stable storage.
    pub fn flush(&mut self) -> io::Result<()> {
        self.write_buffered()?;
        self.file.sync_data()
    }

    /// Number of bytes currently held in memory.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when the requested path couldn't be opened and output goes to
    /// standard output instead.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    fn write_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let result = self.file.write_all(&self.buf);
        self.buf.clear();
        result
    }
}

impl Drop for DurableFile {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            debug!(error = %e, fallback = self.fallback, "flush on close failed");
        }
    }
}

fn is_pipe(file: &File) -> bool {
    file.metadata()
        .map(|meta| meta.file_type().is_fifo())
        .unwrap_or(false)
}
