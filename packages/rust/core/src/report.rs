//! Per-archive outcome tracking.

use std::fmt;
use std::path::{Path, PathBuf};

/// What happened to one note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteOutcome {
    Converted { path: PathBuf, bytes: usize },
    Skipped { reason: String },
}

/// A note as seen in the manifest, with its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteEntry {
    pub id: String,
    pub title: String,
    pub outcome: NoteOutcome,
}

/// Results of exporting one archive.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub archive: PathBuf,
    /// Notebooks listed in the manifest.
    pub notebook_count: usize,
    /// Notes in manifest order.
    pub notes: Vec<NoteEntry>,
}

impl RunReport {
    pub fn new(archive: &Path, notebook_count: usize) -> Self {
        Self {
            archive: archive.to_path_buf(),
            notebook_count,
            notes: Vec::new(),
        }
    }

    pub fn record(&mut self, id: impl Into<String>, title: impl Into<String>, outcome: NoteOutcome) {
        self.notes.push(NoteEntry {
            id: id.into(),
            title: title.into(),
            outcome,
        });
    }

    /// Notes seen.
    pub fn total(&self) -> usize {
        self.notes.len()
    }

    pub fn converted(&self) -> impl Iterator<Item = (&NoteEntry, &Path, usize)> {
        self.notes.iter().filter_map(|n| match &n.outcome {
            NoteOutcome::Converted { path, bytes } => Some((n, path.as_path(), *bytes)),
            NoteOutcome::Skipped { .. } => None,
        })
    }

    pub fn converted_count(&self) -> usize {
        self.converted().count()
    }

    /// Failed notes with their reasons.
    pub fn failures(&self) -> impl Iterator<Item = (&NoteEntry, &str)> {
        self.notes.iter().filter_map(|n| match &n.outcome {
            NoteOutcome::Skipped { reason } => Some((n, reason.as_str())),
            NoteOutcome::Converted { .. } => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// `Converted N notebook(s) and C out of T notes.`
    pub fn summary_line(&self) -> String {
        let noun = if self.notebook_count == 1 {
            "notebook"
        } else {
            "notebooks"
        };
        format!(
            "Converted {} {noun} and {} out of {} notes.",
            self.notebook_count,
            self.converted_count(),
            self.total()
        )
    }

    /// `  - <title> (ID: <id>): <reason>` per failed note.
    pub fn failure_lines(&self) -> Vec<String> {
        self.failures()
            .map(|(note, reason)| format!("  - {} (ID: {}): {reason}", note.title, note.id))
            .collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures = self.failure_lines();
        if !failures.is_empty() {
            writeln!(f, "Failed to convert notes:")?;
            for line in failures {
                writeln!(f, "{line}")?;
            }
        }
        write!(f, "{}", self.summary_line())
    }
}
