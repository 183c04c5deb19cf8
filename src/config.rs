//! Parsing of human-friendly size and duration settings.
//!
//! Configuration values such as `"100m"` (bytes) or `"1h30m"` (seconds) are
//! turned into integers here. Parsing never raises: callers either get an
//! `Option` back or use [`parse_bytes`]/[`parse_duration`], which fall back to
//! a caller-supplied default.

use std::fmt;
use std::str::FromStr;

pub const KB: u64 = 1024;
pub const MB: u64 = 1024 * KB;
pub const GB: u64 = 1024 * MB;

pub const MINUTE: u64 = 60;
pub const HOUR: u64 = 60 * MINUTE;
pub const DAY: u64 = 24 * HOUR;

/// Upper bound for any size setting (100 GiB).
pub const MAX_BYTES: u64 = 100 * GB;
/// Upper bound for any duration setting (100 days).
pub const MAX_SECONDS: u64 = 100 * DAY;

/// A byte count parsed from text like `"10m"` or `"1'000k"`.
///
/// # Examples
///
/// ```
/// # use redirect_logger::config::Bytes;
/// assert_eq!(Bytes::parse("312kb").map(|b| b.value()), Some(312 * 1024));
/// assert_eq!(Bytes::parse("xyz"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Bytes(u64);

impl Bytes {
    /// Wraps a raw byte count, clamped to [`MAX_BYTES`].
    pub const fn new(value: u64) -> Self {
        if value > MAX_BYTES {
            Self(MAX_BYTES)
        } else {
            Self(value)
        }
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// Parses a size with an optional `b`, `k`, `m` or `g` suffix.
    ///
    /// Suffixes are case-insensitive and may carry a trailing `b` (`"kb"`,
    /// `"MB"`). Spaces and apostrophes between digits are ignored. Returns
    /// `None` for zero or anything that isn't a size.
    pub fn parse(text: &str) -> Option<Self> {
        let (value, rest) = split_number(text.trim())?;
        let unit = match rest.to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" | "kb" => KB,
            "m" | "mb" => MB,
            "g" | "gb" => GB,
            _ => return None,
        };
        if value == 0 {
            return None;
        }
        Some(Self::new(value.saturating_mul(unit)))
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}b", self.0)
    }
}

impl FromStr for Bytes {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid size: {s:?}"))
    }
}

/// A number of seconds parsed from text like `"90m"` or `"1h5m1s"`.
///
/// # Examples
///
/// ```
/// # use redirect_logger::config::Seconds;
/// assert_eq!(Seconds::parse("1h5m1s").map(|s| s.value()), Some(3661));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Seconds(u64);

impl Seconds {
    /// Wraps a raw number of seconds, clamped to [`MAX_SECONDS`].
    pub const fn new(value: u64) -> Self {
        if value > MAX_SECONDS {
            Self(MAX_SECONDS)
        } else {
            Self(value)
        }
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// Parses one or more `<number><unit>` groups and sums them.
    ///
    /// Units are `s`, `m`, `h` and `d` (case-insensitive). A trailing number
    /// without a unit counts as seconds. Returns `None` for a zero total or
    /// anything that isn't a duration.
    pub fn parse(text: &str) -> Option<Self> {
        let mut rest = text.trim();
        if rest.is_empty() {
            return None;
        }

        let mut total: u64 = 0;
        while !rest.is_empty() {
            let (value, tail) = split_number(rest)?;
            let mut chars = tail.chars();
            let unit = match chars.next().map(|c| c.to_ascii_lowercase()) {
                None => 1,
                Some('s') => 1,
                Some('m') => MINUTE,
                Some('h') => HOUR,
                Some('d') => DAY,
                Some(_) => return None,
            };
            total = total.saturating_add(value.saturating_mul(unit));
            rest = chars.as_str().trim_start();
        }

        if total == 0 {
            return None;
        }
        Some(Self::new(total))
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl FromStr for Seconds {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid duration: {s:?}"))
    }
}

/// Parses a size setting, substituting `default` when the text is unusable.
///
/// # Examples
///
/// ```
/// # use redirect_logger::config::{parse_bytes, MB};
/// assert_eq!(parse_bytes("100m", 0), 100 * MB);
/// assert_eq!(parse_bytes("lots", 42), 42);
/// ```
pub fn parse_bytes(text: &str, default: u64) -> u64 {
    Bytes::parse(text).map_or(default, Bytes::value)
}

/// Parses a duration setting, substituting `default` when the text is unusable.
pub fn parse_duration(text: &str, default: u64) -> u64 {
    Seconds::parse(text).map_or(default, Seconds::value)
}

/// Splits a leading run of digits off `s`.
///
/// Spaces and apostrophes are skipped once the first digit has been seen.
/// Returns the value (saturating) and the remainder with leading whitespace
/// removed.
fn split_number(s: &str) -> Option<(u64, &str)> {
    let mut value: u64 = 0;
    let mut digits = 0usize;
    let mut end = 0usize;

    for (i, c) in s.char_indices() {
        match c {
            '0'..='9' => {
                value = value
                    .saturating_mul(10)
                    .saturating_add(u64::from(c as u8 - b'0'));
                digits += 1;
                end = i + 1;
            }
            ' ' | '\'' if digits > 0 => {}
            _ => break,
        }
    }

    if digits == 0 {
        return None;
    }
    Some((value, s[end..].trim_start()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_number() {
        assert_eq!(split_number("12ab"), Some((12, "ab")));
        assert_eq!(split_number("1 000'000 k"), Some((1_000_000, "k")));
        assert_eq!(split_number(" 1"), None);
        assert_eq!(split_number("k"), None);
    }

    #[test]
    fn test_split_number_saturates() {
        let (value, rest) = split_number("99999999999999999999999").unwrap();
        assert_eq!(value, u64::MAX);
        assert_eq!(rest, "");
    }
}
