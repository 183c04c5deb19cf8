use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, TimeZone, Utc};
use tracing::debug;

use crate::config::{Seconds, DAY, HOUR};
use crate::durable_file::DurableFile;
use crate::efficient_clock::wall_clock_seconds;
use crate::rotate_policy::{self, delegate_policy_setters, Metadata, Rotate, RotatePolicy};

/// Spans a time rotation can use. Requests are rounded up to the next rung.
pub const SPAN_LADDER: [u64; 13] = [
    HOUR,
    2 * HOUR,
    3 * HOUR,
    4 * HOUR,
    6 * HOUR,
    8 * HOUR,
    12 * HOUR,
    DAY,
    2 * DAY,
    3 * DAY,
    4 * DAY,
    6 * DAY,
    7 * DAY,
];

/// Snaps a requested span to the smallest ladder rung at or above it,
/// capping at the largest.
///
/// # Examples
///
/// ```
/// # use redirect_logger::time_rotate::align_span;
/// assert_eq!(align_span(90 * 60), 2 * 3600);
/// assert_eq!(align_span(30 * 86400), 7 * 86400);
/// ```
pub fn align_span(seconds: u64) -> u64 {
    SPAN_LADDER
        .iter()
        .copied()
        .find(|&rung| rung >= seconds)
        .unwrap_or(SPAN_LADDER[SPAN_LADDER.len() - 1])
}

/// Start of the bucket containing `seconds`: day-aligned for spans of a day
/// or more, span-aligned otherwise.
pub fn bucket_start(seconds: i64, span: i64) -> i64 {
    let unit = if span >= DAY as i64 { DAY as i64 } else { span };
    seconds - seconds.rem_euclid(unit)
}

/// File tag of the bucket starting at `seconds`: `YYYY-MM-DD_HH` local time.
pub fn bucket_tag(seconds: i64) -> String {
    match Local.timestamp_opt(seconds, 0).earliest() {
        Some(t) => t.format("%Y-%m-%d_%H").to_string(),
        None => Utc
            .timestamp_opt(seconds, 0)
            .earliest()
            .map(|t| t.format("%Y-%m-%d_%H").to_string())
            .unwrap_or_default(),
    }
}

/// Inverse of [`bucket_tag`]. Returns `None` for anything else.
fn parse_tag(tag: &str) -> Option<i64> {
    let (date, hour) = tag.split_once('_')?;
    if hour.len() != 2 || !hour.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let hour: u32 = hour.parse().ok()?;
    date.and_hms_opt(hour, 0, 0)?
        .and_local_timezone(Local)
        .earliest()
        .map(|t| t.timestamp())
}

/// Time-triggered rotation over time-bucketed file names.
///
/// Each bucket covers one span and is written to `{name}.{YYYY-MM-DD_HH}.{ext}`.
/// At most `max_files` buckets are retained; creating one more unlinks the
/// oldest. Bucket files are always opened for append, so a restart inside the
/// same bucket continues the same file.
///
/// A rotation advances the bucket by exactly one span, even when events have
/// jumped further ahead. Later writes keep triggering rotations until the
/// bucket catches up.
#[derive(Debug)]
pub struct TimeRotate {
    policy: RotatePolicy,
    span: i64,
    current: i64,
    /// Retained bucket files, oldest first.
    witness: VecDeque<PathBuf>,
}

impl TimeRotate {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Starts rotating at the bucket containing the current wall-clock time.
    pub fn new(policy: RotatePolicy, span: u64) -> Self {
        Self::at(policy, span, wall_clock_seconds())
    }

    /// Starts rotating at the bucket containing `now`.
    ///
    /// Probes the directory: files whose tag isn't a bucket are deleted, as are
    /// buckets older than `max_files` spans. The newest `max_files - 1` older
    /// buckets stay tracked for retention; older leftovers are deleted.
    pub fn at(policy: RotatePolicy, span: u64, now: i64) -> Self {
        let span = align_span(span) as i64;
        let current = bucket_start(now, span);
        let earliest = current - policy.max_files() as i64 * span;
        let current_path = policy.path(&bucket_tag(current));

        let mut rest: Vec<(i64, PathBuf)> = Vec::with_capacity(policy.max_files());
        for tag in policy.probe() {
            let path = policy.path(&tag);
            match parse_tag(&tag) {
                None => {
                    debug!(path = %path.display(), "removing foreign file");
                    policy.remove(&path);
                }
                Some(t) if t <= earliest => {
                    debug!(path = %path.display(), "removing expired file");
                    policy.remove(&path);
                }
                // The current bucket is reopened by `next`; newer ones are left alone.
                Some(t) if t >= current || path == current_path => {}
                Some(t) => rest.push((t, path)),
            }
        }

        rest.sort_by_key(|(t, _)| *t);
        let excess = rest.len().saturating_sub(policy.max_files() - 1);
        for (_, path) in rest.drain(..excess) {
            debug!(path = %path.display(), "evicting");
            policy.remove(&path);
        }

        Self {
            policy,
            span,
            current,
            witness: rest.into_iter().map(|(_, path)| path).collect(),
        }
    }

    pub fn policy(&self) -> &RotatePolicy {
        &self.policy
    }

    /// Aligned span in seconds.
    pub fn span(&self) -> i64 {
        self.span
    }

    /// Start of the current bucket, seconds since the Unix epoch.
    pub fn current_bucket(&self) -> i64 {
        self.current
    }

    /// Retained bucket files, oldest first.
    pub fn retained(&self) -> impl Iterator<Item = &Path> {
        self.witness.iter().map(PathBuf::as_path)
    }

    fn current_path(&self) -> PathBuf {
        self.policy.path(&bucket_tag(self.current))
    }
}

impl Rotate for TimeRotate {
    fn spill(&mut self, metadata: Metadata) -> bool {
        if metadata.seconds <= self.current + self.span {
            return false;
        }
        self.current += self.span;
        true
    }

    fn next(&mut self) -> io::Result<DurableFile> {
        let path = self.current_path();
        if self.witness.back() != Some(&path) {
            if self.witness.len() >= self.policy.max_files() {
                if let Some(oldest) = self.witness.pop_front() {
                    self.policy.remove(&oldest);
                }
            }
            self.witness.push_back(path.clone());
        }

        self.policy.link_alias(&path);
        debug!(bucket = self.current, path = %path.display(), "next bucket");
        DurableFile::open(&path, self.policy.buf_size(), true)
    }
}

/// Builder for [`TimeRotate`]. The span defaults to one hour.
#[derive(Debug, Clone)]
pub struct Builder {
    policy: rotate_policy::Builder,
    span: u64,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            policy: RotatePolicy::builder(),
            span: HOUR,
        }
    }
}

impl Builder {
    delegate_policy_setters!();

    /// Sets the span, snapped to [`SPAN_LADDER`].
    pub fn span(mut self, span: u64) -> Self {
        self.span = align_span(span);
        self
    }

    pub fn span_seconds(self, seconds: Seconds) -> Self {
        self.span(seconds.value())
    }

    pub fn build(self) -> TimeRotate {
        TimeRotate::new(self.policy.build(), self.span)
    }

    /// Like [`build`](Builder::build) with an explicit notion of "now".
    pub fn build_at(self, now: i64) -> TimeRotate {
        TimeRotate::at(self.policy.build(), self.span, now)
    }
}
