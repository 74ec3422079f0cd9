//! Export orchestration for nsxconv.
//!
//! This crate ties the archive reader, the markup converter, and reverse
//! geocoding together into the end-to-end export of `.nsx` archives into a
//! directory tree of documents.

pub mod attachments;
pub mod notebooks;
pub mod pipeline;
pub mod report;
pub mod writer;

pub use pipeline::{
    ExportContext, ProgressReporter, SilentProgress, export_archive, export_archives,
};
pub use report::{NoteEntry, NoteOutcome, RunReport};
