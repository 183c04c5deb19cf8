use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::config::{Bytes, MB};
use crate::durable_file::DurableFile;
use crate::rotate_policy::{self, delegate_policy_setters, Metadata, Rotate, RotatePolicy};

/// Size-triggered rotation over a fixed ring of numbered slots.
///
/// Files are named `{name}.0.{ext}` through `{name}.{N-1}.{ext}`. Once the
/// active slot has taken `size` bytes the next slot (modulo `N`) is truncated
/// and becomes active, so at most `N` files ever exist.
///
/// On construction the directory is probed: files whose tag isn't a slot
/// number are deleted, and the most recently modified slot file decides where
/// to resume. If that file is still under the threshold the first
/// [`next`](Rotate::next) appends to it instead of starting over.
///
/// # Examples
///
/// ```
/// # use redirect_logger::{Logger, SizeRotate};
/// # let dir = tempfile::tempdir().unwrap();
/// let rotate = SizeRotate::builder()
///     .base(dir.path())
///     .name("app")
///     .max_files(3)
///     .size(1024)
///     .build();
/// let mut logger = Logger::new(rotate).unwrap();
/// logger.log(b"hello\n", 0).unwrap();
/// ```
#[derive(Debug)]
pub struct SizeRotate {
    policy: RotatePolicy,
    size: u64,
    written: u64,
    /// Slot opened by the next call to `next`.
    slot: usize,
    active: Option<usize>,
    witness: Vec<PathBuf>,
    /// Byte count of a partially filled slot file to append to.
    resume: Option<u64>,
}

/// The most recently modified witness file seen while probing.
struct LatestFile {
    slot: usize,
    modified: Option<SystemTime>,
    len: u64,
}

impl SizeRotate {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Builds the slot ring for `policy` and reconciles it with what's on disk.
    pub fn new(policy: RotatePolicy, size: u64) -> Self {
        let n = policy.max_files();
        let witness: Vec<PathBuf> = (0..n).map(|i| policy.path(&i.to_string())).collect();

        let mut latest: Option<LatestFile> = None;
        for tag in policy.probe() {
            let path = policy.path(&tag);
            let Some(slot) = parse_slot(&tag, n) else {
                debug!(path = %path.display(), "removing foreign file");
                policy.remove(&path);
                continue;
            };
            let Ok(meta) = fs::metadata(&path) else {
                continue;
            };
            let modified = meta.modified().ok();
            if latest.as_ref().map_or(true, |l| modified > l.modified) {
                latest = Some(LatestFile {
                    slot,
                    modified,
                    len: meta.len(),
                });
            }
        }

        let (slot, resume) = match latest {
            Some(l) if l.len < size => (l.slot, Some(l.len)),
            Some(l) => ((l.slot + 1) % n, None),
            None => (0, None),
        };
        debug!(slot, resume = ?resume, "size rotation resumed");

        Self {
            policy,
            size,
            written: 0,
            slot,
            active: None,
            witness,
            resume,
        }
    }

    pub fn policy(&self) -> &RotatePolicy {
        &self.policy
    }

    /// Threshold in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes accounted to the active slot.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Slot of the active file, `None` before the first rotation.
    pub fn active_slot(&self) -> Option<usize> {
        self.active
    }

    /// Canonical path of slot `i`.
    pub fn slot_path(&self, i: usize) -> Option<&Path> {
        self.witness.get(i).map(PathBuf::as_path)
    }
}

impl Rotate for SizeRotate {
    /// Rotation is due once the active slot reaches the threshold. The bytes
    /// of a write that triggers it are not accounted again.
    fn spill(&mut self, metadata: Metadata) -> bool {
        if self.written + metadata.size >= self.size {
            return true;
        }
        self.written += metadata.size;
        false
    }

    fn next(&mut self) -> io::Result<DurableFile> {
        let slot = self.slot;
        self.slot = (slot + 1) % self.witness.len();
        self.active = Some(slot);

        let path = &self.witness[slot];
        self.policy.link_alias(path);

        let append = match self.resume.take() {
            Some(existing) => {
                self.written = existing;
                true
            }
            None => {
                self.written = 0;
                false
            }
        };
        debug!(slot, append, path = %path.display(), "next slot");
        DurableFile::open(path, self.policy.buf_size(), append)
    }
}

/// Accepts only canonical decimal slot numbers below `n`.
fn parse_slot(tag: &str, n: usize) -> Option<usize> {
    if tag.is_empty() || !tag.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let slot: usize = tag.parse().ok()?;
    (slot < n && slot.to_string() == tag).then_some(slot)
}

/// Builder for [`SizeRotate`]. The threshold defaults to 10 MiB.
#[derive(Debug, Clone)]
pub struct Builder {
    policy: rotate_policy::Builder,
    size: u64,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            policy: RotatePolicy::builder(),
            size: 10 * MB,
        }
    }
}

impl Builder {
    delegate_policy_setters!();

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn size_bytes(self, bytes: Bytes) -> Self {
        self.size(bytes.value())
    }

    pub fn build(self) -> SizeRotate {
        SizeRotate::new(self.policy.build(), self.size)
    }
}
