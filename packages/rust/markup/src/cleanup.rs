//! Text passes applied around the external conversion.
//!
//! Each pass is a function `&str -> String`. One pass prepares the HTML,
//! the rest normalize what the converter produced.

use std::sync::LazyLock;

use regex::Regex;

/// Run the post-conversion pipeline on converter output.
pub(crate) fn run_pipeline(converted: &str) -> String {
    let mut result = converted.to_string();

    result = strip_escape_backslashes(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pre-conversion: inline image markers
// ---------------------------------------------------------------------------

/// Turn the exporter's placeholder `<img>` tags into plain images whose
/// source is the attachment's reference token.
///
/// `<img class="syno-notestation-image-object" src="…" ref="TOKEN">` becomes
/// `<img src="TOKEN">`, so the token survives conversion as the image target.
pub(crate) fn rewrite_image_markers(html: &str) -> String {
    static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<img class=[^>]*syno-notestation-image-object[^>]*src=[^>]*ref=")
            .expect("valid regex")
    });

    MARKER_RE.replace_all(html, "<img src=").to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Strip escape backslashes
// ---------------------------------------------------------------------------

/// Remove every backslash the converter emitted as an escape.
fn strip_escape_backslashes(text: &str) -> String {
    text.replace('\\', "")
}

// ---------------------------------------------------------------------------
// Pass 2: Ensure trailing newline
// ---------------------------------------------------------------------------

/// Ensure non-empty text ends with exactly one newline.
fn ensure_trailing_newline(text: &str) -> String {
    let trimmed = text.trim_end_matches('\n');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{trimmed}\n")
}

// ---------------------------------------------------------------------------
// Image embedding
// ---------------------------------------------------------------------------

/// Drop `file://` schemes so viewers render local images inline.
pub(crate) fn strip_file_scheme(text: &str) -> String {
    text.replace("file://", "")
}
