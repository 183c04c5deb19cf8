//! Naming, layout and housekeeping shared by the rotation strategies.
//!
//! Every managed file lives at `{base}/{name}.{tag}.{ext}`. The tag encodes a
//! slot index or a time bucket depending on the strategy. The stable alias
//! `{base}/{name}.{ext}` is a symlink re-pointed at the active file on every
//! rotation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::{Bytes, MB};
use crate::durable_file::DurableFile;

/// Per-write information handed from a [`Logger`](crate::Logger) to its
/// rotation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Number of bytes just written.
    pub size: u64,
    /// Event time in seconds since the Unix epoch.
    pub seconds: i64,
}

/// The contract between a [`Logger`](crate::Logger) and a rotation strategy.
///
/// Implemented by [`SizeRotate`](crate::SizeRotate) and
/// [`TimeRotate`](crate::TimeRotate).
pub trait Rotate {
    /// Accounts for one write and reports whether the active file must be
    /// replaced now.
    fn spill(&mut self, metadata: Metadata) -> bool;

    /// Opens the file that becomes active next and re-points the stable alias
    /// at it.
    fn next(&mut self) -> io::Result<DurableFile>;
}

impl<R: Rotate + ?Sized> Rotate for Box<R> {
    fn spill(&mut self, metadata: Metadata) -> bool {
        (**self).spill(metadata)
    }

    fn next(&mut self) -> io::Result<DurableFile> {
        (**self).next()
    }
}

/// Immutable layout settings shared by a strategy and its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatePolicy {
    base: PathBuf,
    name: String,
    ext: String,
    alias: PathBuf,
    max_files: usize,
    buf_size: usize,
}

impl RotatePolicy {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Path of the file carrying `tag`. An empty tag yields the stable alias.
    ///
    /// # Examples
    ///
    /// ```
    /// # use redirect_logger::RotatePolicy;
    /// # use std::path::Path;
    /// let policy = RotatePolicy::builder().base("/var/log").name("app").build();
    /// assert_eq!(policy.path("3"), Path::new("/var/log/app.3.log"));
    /// assert_eq!(policy.path(""), Path::new("/var/log/app.log"));
    /// ```
    pub fn path(&self, tag: &str) -> PathBuf {
        let file_name = if tag.is_empty() {
            format!("{}.{}", self.name, self.ext)
        } else {
            format!("{}.{}.{}", self.name, tag, self.ext)
        };
        self.base.join(file_name)
    }

    /// Lists the tags of regular files in `base` that follow the naming
    /// convention.
    ///
    /// The stable alias is unlinked first since the next rotation recreates
    /// it. A directory that can't be read is reported and treated as empty.
    pub fn probe(&self) -> Vec<String> {
        let _ = fs::remove_file(&self.alias);

        let entries = match fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.base.display(), error = %e, "opendir failed");
                return Vec::new();
            }
        };

        let prefix = format!("{}.", self.name);
        let suffix = format!(".{}", self.ext);
        let mut tags = Vec::with_capacity(self.max_files);

        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.len() <= prefix.len() + suffix.len() {
                continue;
            }
            if let Some(tag) = file_name
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            {
                tags.push(tag.to_string());
            }
        }
        tags
    }

    /// Deletes a managed file as housekeeping. Missing files are fine.
    pub fn remove(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "remove failed"),
        }
    }

    /// Re-points the stable alias at `target`.
    ///
    /// The link stores only the file name so the directory stays relocatable.
    pub fn link_alias(&self, target: &Path) {
        let _ = fs::remove_file(&self.alias);
        let link_target = target.file_name().map(Path::new).unwrap_or(target);
        if let Err(e) = std::os::unix::fs::symlink(link_target, &self.alias) {
            warn!(alias = %self.alias.display(), error = %e, "symlink failed");
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// The stable alias path, `{base}/{name}.{ext}`.
    pub fn alias(&self) -> &Path {
        &self.alias
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    pub fn buf_size(&self) -> usize {
        self.buf_size
    }
}

/// Builder for [`RotatePolicy`].
///
/// Defaults: base `"."`, extension `"log"`, 6 files, 1 MiB buffer.
#[derive(Debug, Clone)]
pub struct Builder {
    base: PathBuf,
    name: String,
    ext: String,
    max_files: usize,
    buf_size: usize,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            base: PathBuf::from("."),
            name: String::new(),
            ext: "log".to_string(),
            max_files: 6,
            buf_size: MB as usize,
        }
    }
}

impl Builder {
    pub fn base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = base.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn ext(mut self, ext: impl Into<String>) -> Self {
        self.ext = ext.into();
        self
    }

    /// Retention count; at least one file is always kept.
    pub fn max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files.max(1);
        self
    }

    pub fn buf_size(mut self, buf_size: usize) -> Self {
        self.buf_size = buf_size;
        self
    }

    pub fn buf_size_bytes(self, bytes: Bytes) -> Self {
        self.buf_size(bytes.value() as usize)
    }

    pub fn build(self) -> RotatePolicy {
        let alias = self.base.join(format!("{}.{}", self.name, self.ext));
        RotatePolicy {
            base: self.base,
            name: self.name,
            ext: self.ext,
            alias,
            max_files: self.max_files,
            buf_size: self.buf_size,
        }
    }
}

/// Generates the [`Builder`] setters on a strategy builder that wraps one in a
/// `policy` field.
macro_rules! delegate_policy_setters {
    () => {
        pub fn base(mut self, base: impl Into<std::path::PathBuf>) -> Self {
            self.policy = self.policy.base(base);
            self
        }

        pub fn name(mut self, name: impl Into<String>) -> Self {
            self.policy = self.policy.name(name);
            self
        }

        pub fn ext(mut self, ext: impl Into<String>) -> Self {
            self.policy = self.policy.ext(ext);
            self
        }

        pub fn max_files(mut self, max_files: usize) -> Self {
            self.policy = self.policy.max_files(max_files);
            self
        }

        pub fn buf_size(mut self, buf_size: usize) -> Self {
            self.policy = self.policy.buf_size(buf_size);
            self
        }

        pub fn buf_size_bytes(mut self, bytes: $crate::config::Bytes) -> Self {
            self.policy = self.policy.buf_size_bytes(bytes);
            self
        }
    };
}

pub(crate) use delegate_policy_setters;
