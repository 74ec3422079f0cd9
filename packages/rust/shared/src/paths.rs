//! Filesystem-safe names and collision-free path allocation.
//!
//! Every directory and file the exporter creates goes through
//! [`PathAllocator::allocate`], so notebooks, attachments, and notes all
//! follow the same `name`, `name_1`, `name_2`, … rule.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

/// Maximum length of a sanitized path segment, in characters.
pub const MAX_SEGMENT_CHARS: usize = 100;

/// Fallback used when a title sanitizes to nothing.
pub const UNTITLED: &str = "Untitled";

/// Turn an arbitrary title into a single, length-bounded path segment.
///
/// `: / \ |` become `-`, `?` and `*` are dropped, `<>` become `()`, `"`
/// becomes `'`, control characters are dropped, and percent-encoded
/// sequences are decoded. The rules are repeated until nothing changes, so
/// a decoded `%2F` can never smuggle a separator through and
/// `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = sanitize_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current.chars().take(MAX_SEGMENT_CHARS).collect()
}

/// [`sanitize`], substituting [`UNTITLED`] for an empty result.
pub fn sanitize_or_untitled(input: &str) -> String {
    let sanitized = sanitize(input);
    if sanitized.is_empty() {
        UNTITLED.to_string()
    } else {
        sanitized
    }
}

fn sanitize_once(input: &str) -> String {
    let replaced: String = input
        .chars()
        .filter_map(|c| match c {
            ':' | '/' | '\\' | '|' => Some('-'),
            '?' | '*' => None,
            '<' => Some('('),
            '>' => Some(')'),
            '"' => Some('\''),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();
    percent_decode_str(&replaced)
        .decode_utf8_lossy()
        .into_owned()
}

// ---------------------------------------------------------------------------
// PathAllocator
// ---------------------------------------------------------------------------

/// Hands out paths that neither exist on disk nor were handed out before.
///
/// The claimed set only grows; one allocator lives for the whole processing
/// of an archive.
#[derive(Debug, Default)]
pub struct PathAllocator {
    claimed: HashSet<PathBuf>,
}

impl PathAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `parent/name` (or `parent/name.ext`), appending `_1`, `_2`, …
    /// to the stem until the path is free.
    pub fn allocate(&mut self, parent: &Path, name: &str, ext: Option<&str>) -> PathBuf {
        let mut candidate = parent.join(file_name(name, None, ext));
        let mut n = 1usize;
        while self.is_taken(&candidate) {
            candidate = parent.join(file_name(name, Some(n), ext));
            n += 1;
        }
        self.claimed.insert(candidate.clone());
        candidate
    }

    /// Allocate a file name that already carries its extension (`photo.png`).
    ///
    /// The suffix goes before the last `.`; names without one get it appended.
    pub fn allocate_file(&mut self, parent: &Path, file_name: &str) -> PathBuf {
        match file_name.rsplit_once('.') {
            Some((stem, ext)) => self.allocate(parent, stem, Some(ext)),
            None => self.allocate(parent, file_name, None),
        }
    }

    fn is_taken(&self, path: &Path) -> bool {
        self.claimed.contains(path) || path.symlink_metadata().is_ok()
    }
}

fn file_name(stem: &str, suffix: Option<usize>, ext: Option<&str>) -> String {
    let mut name = match suffix {
        Some(n) => format!("{stem}_{n}"),
        None => stem.to_string(),
    };
    if let Some(ext) = ext {
        name.push('.');
        name.push_str(ext);
    }
    name
}
