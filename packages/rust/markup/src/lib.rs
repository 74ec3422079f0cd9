//! HTML-to-markup conversion and document assembly.
//!
//! Note bodies are HTML fragments. They are handed to a [`MarkupConverter`]
//! (pandoc, or the in-process Markdown converter), cleaned up, and then
//! finished into a document: reference tokens replaced by attachment links,
//! and an optional metadata header in front.

pub mod assemble;
mod cleanup;
pub mod converter;
pub mod header;

pub use assemble::{InlineReplacement, ResolvedAttachments, convert_body, finish_document};
pub use converter::{
    BuiltinMarkdownConverter, MarkupConverter, PandocConverter, PandocVersion, converter_for,
};
pub use header::{
    HeaderField, HeaderKey, Location, NoteMetadata, PROVENANCE_TAG, build_header_fields,
    render_header,
};
