use std::io;

use tracing::{debug, warn};

use crate::durable_file::DurableFile;
use crate::rotate_policy::{Metadata, Rotate};

/// Couples a rotation strategy with the file it is currently writing.
///
/// Every [`log`](Logger::log) call writes the bytes and then asks the strategy
/// whether to roll over. A rollover flushes and syncs the outgoing file before
/// the next one is opened.
///
/// # Thread Safety
///
/// Logger is not synchronized. The reactor forwards to each logger from its
/// single thread, so no two `log` calls on the same instance ever overlap.
///
/// # Examples
///
/// ```
/// # use redirect_logger::{Logger, TimeRotate};
/// # let dir = tempfile::tempdir().unwrap();
/// let rotate = TimeRotate::builder().base(dir.path()).name("app").span(3600).build();
/// let mut logger = Logger::new(rotate).unwrap();
/// logger.log(b"started\n", redirect_logger::current_seconds()).unwrap();
/// ```
pub struct Logger<R: Rotate> {
    rotate: R,
    file: DurableFile,
}

impl<R: Rotate> Logger<R> {
    /// Opens the first file of `rotate`.
    pub fn new(mut rotate: R) -> io::Result<Self> {
        let file = rotate.next()?;
        Ok(Self { rotate, file })
    }

    /// Writes `bytes` stamped with `seconds` and rotates if the strategy says so.
    ///
    /// A failed write is returned to the caller but still counts towards
    /// rotation; nothing is retried. If opening the next file fails the
    /// current one stays active.
    pub fn log(&mut self, bytes: &[u8], seconds: i64) -> io::Result<()> {
        let written = self.file.write(bytes);

        let metadata = Metadata {
            size: bytes.len() as u64,
            seconds,
        };
        if self.rotate.spill(metadata) {
            self.rotate_now();
        }
        written
    }

    /// Flushes and syncs the active file.
    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    pub fn rotation(&self) -> &R {
        &self.rotate
    }

    fn rotate_now(&mut self) {
        if let Err(e) = self.file.flush() {
            warn!(error = %e, "flush before rotation failed");
        }
        match self.rotate.next() {
            Ok(file) => {
                self.file = file;
                debug!("rotated");
            }
            Err(e) => warn!(error = %e, "rotation failed, keeping current file"),
        }
    }
}

/// Destination the reactor forwards captured bytes to.
///
/// Implemented by every [`Logger`]; the reactor stores sinks as trait objects
/// so loggers with different strategies can share one registry.
pub trait LogSink: Send {
    /// Consumes one chunk read from a redirected descriptor.
    fn log(&mut self, bytes: &[u8], seconds: i64);

    /// Pushes everything buffered so far to disk.
    fn flush(&mut self);
}

impl<R: Rotate + Send> LogSink for Logger<R> {
    fn log(&mut self, bytes: &[u8], seconds: i64) {
        if let Err(e) = Logger::log(self, bytes, seconds) {
            warn!(error = %e, len = bytes.len(), "log write failed");
        }
    }

    fn flush(&mut self) {
        if let Err(e) = Logger::flush(self) {
            warn!(error = %e, "log flush failed");
        }
    }
}
