//! Runtime `{}` templates for building log payloads.
//!
//! Templates use `{}` for each argument and `{{`/`}}` for literal braces, like
//! `format!`, but are parsed at runtime so they can come from configuration.
//! Parsed templates are cached process-wide; the hit path only takes a shared
//! read lock.

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::ops::Range;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;

lazy_static! {
    /// Parsed templates keyed by their source text.
    static ref TEMPLATE_CACHE: RwLock<HashMap<String, Arc<Template>>> = RwLock::new(HashMap::new());
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(Range<usize>),
    Slot,
}

/// A parsed template.
///
/// Arguments fill the slots in order. Missing arguments render as nothing and
/// surplus arguments are ignored. A stray `{` or `}` ends parsing; everything
/// from there on is kept verbatim.
///
/// # Examples
///
/// ```
/// # use redirect_logger::template::Template;
/// let t = Template::parse("#{} took {}ms {{ok}}");
/// assert_eq!(t.slots(), 2);
/// assert_eq!(t.apply(&[&7, &12.5]), "#7 took 12.5ms {ok}");
/// ```
#[derive(Debug)]
pub struct Template {
    source: String,
    pieces: Vec<Piece>,
    slots: usize,
}

impl Template {
    pub fn parse(source: &str) -> Self {
        let bytes = source.as_bytes();
        let mut pieces = Vec::new();
        let mut literal_start = 0;
        let mut i = 0;

        while i < bytes.len() {
            match (bytes[i], bytes.get(i + 1)) {
                (b'{', Some(b'{')) | (b'}', Some(b'}')) => {
                    push_literal(&mut pieces, literal_start..i + 1);
                    i += 2;
                    literal_start = i;
                }
                (b'{', Some(b'}')) => {
                    push_literal(&mut pieces, literal_start..i);
                    pieces.push(Piece::Slot);
                    i += 2;
                    literal_start = i;
                }
                (b'{', _) | (b'}', _) => break,
                _ => i += 1,
            }
        }
        push_literal(&mut pieces, literal_start..bytes.len());

        let slots = pieces.iter().filter(|p| **p == Piece::Slot).count();
        Self {
            source: source.to_string(),
            pieces,
            slots,
        }
    }

    /// Number of `{}` slots.
    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Renders the template with `args` in slot order.
    pub fn apply(&self, args: &[&dyn fmt::Display]) -> String {
        let mut out = String::with_capacity(self.source.len() + 16 * args.len());
        let mut args = args.iter();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(range) => out.push_str(&self.source[range.clone()]),
                Piece::Slot => {
                    if let Some(arg) = args.next() {
                        let _ = write!(out, "{arg}");
                    }
                }
            }
        }
        out
    }
}

fn push_literal(pieces: &mut Vec<Piece>, range: Range<usize>) {
    if !range.is_empty() {
        pieces.push(Piece::Literal(range));
    }
}

/// Returns the cached parse of `source`, parsing it on first use.
pub fn cached(source: &str) -> Arc<Template> {
    if let Some(template) = TEMPLATE_CACHE.read().get(source) {
        return Arc::clone(template);
    }

    let parsed = Arc::new(Template::parse(source));
    let mut cache = TEMPLATE_CACHE.write();
    Arc::clone(cache.entry(source.to_string()).or_insert(parsed))
}

/// Renders `template` with `args`, using the process-wide cache.
///
/// # Examples
///
/// ```
/// # use redirect_logger::template::format;
/// assert_eq!(format("{} #{}\n", &[&"pid", &42]), "pid #42\n");
/// ```
pub fn format(template: &str, args: &[&dyn fmt::Display]) -> String {
    cached(template).apply(args)
}

/// Checks that every brace in `s` is either an escape or part of a `{}` slot.
#[doc(hidden)]
pub const fn validate(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                if i + 1 < bytes.len() && (bytes[i + 1] == b'{' || bytes[i + 1] == b'}') {
                    i += 2;
                    continue;
                }
                return false;
            }
            b'}' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'}' {
                    i += 2;
                    continue;
                }
                return false;
            }
            _ => {}
        }
        i += 1;
    }
    true
}

/// Renders a runtime template with any `Display` arguments.
///
/// ```
/// # use redirect_logger::format_log;
/// let line = format_log!("{} #{} this is a test\n", "worker", 3);
/// assert_eq!(line, "worker #3 this is a test\n");
/// ```
#[macro_export]
macro_rules! format_log {
    ($template:expr $(, $arg:expr)* $(,)?) => {
        $crate::template::format($template, &[$(&$arg as &dyn ::std::fmt::Display),*])
    };
}
