//! End-to-end export: archive → notebooks → notes → documents on disk.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local};
use tracing::{debug, info, instrument, warn};

use nsxconv_archive::NsxArchive;
use nsxconv_geocode::ReverseGeocoder;
use nsxconv_markup::{Location, MarkupConverter, NoteMetadata, convert_body, finish_document};
use nsxconv_shared::{ConvertError, ExportConfig, NoteRecord, PathAllocator, Result, UNTITLED};

use crate::attachments::AttachmentResolver;
use crate::notebooks::NotebookIndex;
use crate::report::{NoteOutcome, RunReport};
use crate::writer::write_note;

/// Progress callback for reporting export status.
pub trait ProgressReporter: Send + Sync {
    /// Called when an archive has been opened.
    fn archive_started(&self, path: &Path, notes: usize);
    /// Called after every note, converted or not.
    fn note_finished(&self, title: &str, current: usize, total: usize);
    /// Called when an archive is done.
    fn archive_finished(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn archive_started(&self, _path: &Path, _notes: usize) {}
    fn note_finished(&self, _title: &str, _current: usize, _total: usize) {}
    fn archive_finished(&self, _report: &RunReport) {}
}

/// Collaborators shared by every archive of a run.
pub struct ExportContext<'a> {
    pub config: &'a ExportConfig,
    pub converter: &'a dyn MarkupConverter,
    /// `None` disables reverse geocoding.
    pub geocoder: Option<&'a dyn ReverseGeocoder>,
    pub progress: &'a dyn ProgressReporter,
}

/// Export every archive in order into `dest_root`.
///
/// Unreadable archives are logged and skipped; only fatal errors abort.
#[instrument(skip_all, fields(archives = paths.len(), dest = %dest_root.display()))]
pub async fn export_archives(
    paths: &[PathBuf],
    dest_root: &Path,
    ctx: &ExportContext<'_>,
) -> Result<Vec<RunReport>> {
    let mut reports = Vec::with_capacity(paths.len());

    for path in paths {
        match export_archive(path, dest_root, ctx).await {
            Ok(report) => reports.push(report),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(archive = %path.display(), error = %e, "skipping archive"),
        }
    }

    Ok(reports)
}

/// Export one archive into `dest_root`.
///
/// 1. Open the archive and read its manifest
/// 2. Allocate notebook directories (trash first)
/// 3. Convert, link attachments, and write each note in manifest order
/// 4. Remove empty media and notebook directories
#[instrument(skip_all, fields(archive = %path.display()))]
pub async fn export_archive(
    path: &Path,
    dest_root: &Path,
    ctx: &ExportContext<'_>,
) -> Result<RunReport> {
    let start = Instant::now();
    let mut archive = NsxArchive::open(path)?;
    std::fs::create_dir_all(dest_root).map_err(|e| ConvertError::io(dest_root, e))?;

    let mut alloc = PathAllocator::new();
    let notebooks =
        NotebookIndex::build(&mut archive, dest_root, &ctx.config.media_dir_name, &mut alloc)?;

    let mut report = RunReport::new(path, archive.manifest().notebook.len());
    let note_ids = archive.manifest().note.clone();
    let total = note_ids.len();

    info!(notebooks = notebooks.len(), notes = total, "exporting archive");
    ctx.progress.archive_started(path, total);

    let mut export = ArchiveExport {
        attachments: AttachmentResolver::new(ctx.config.links, ctx.config.media_dir_name.clone()),
        archive,
        notebooks,
        alloc,
        ctx,
    };

    for (i, id) in note_ids.iter().enumerate() {
        let (title, outcome) = export.note(id).await;
        match &outcome {
            NoteOutcome::Converted { path, bytes } => {
                debug!(note = %id, path = %path.display(), bytes, "note written");
            }
            NoteOutcome::Skipped { reason } => {
                warn!(note = %id, %title, %reason, "note not converted");
            }
        }
        ctx.progress.note_finished(&title, i + 1, total);
        report.record(id.as_str(), title, outcome);
    }

    export.notebooks.remove_empty_dirs();

    info!(
        converted = report.converted_count(),
        total,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "{}",
        report.summary_line()
    );
    ctx.progress.archive_finished(&report);

    Ok(report)
}

// ---------------------------------------------------------------------------
// Per-archive state
// ---------------------------------------------------------------------------

struct ArchiveExport<'c, 'a> {
    archive: NsxArchive,
    notebooks: NotebookIndex,
    attachments: AttachmentResolver,
    alloc: PathAllocator,
    ctx: &'c ExportContext<'a>,
}

impl ArchiveExport<'_, '_> {
    /// Convert and write one note. Any failure is confined to this note.
    async fn note(&mut self, id: &str) -> (String, NoteOutcome) {
        let note = match self.archive.note(id) {
            Ok(note) => note,
            Err(e) => return (UNTITLED.to_string(), skipped(e)),
        };

        let title = note
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        let Some(notebook) = note.parent_id.as_deref().and_then(|p| self.notebooks.get(p)) else {
            let reason = match &note.parent_id {
                Some(parent) => format!("parent notebook {parent} not found"),
                None => "note has no parent notebook".to_string(),
            };
            return (title, NoteOutcome::Skipped { reason });
        };

        let html = note.content.as_deref().unwrap_or_default();
        let converted = match convert_body(html, self.ctx.converter).await {
            Ok(converted) => converted,
            Err(e) => return (title, skipped(e)),
        };

        let resolved = self.attachments.resolve(
            &title,
            note.attachments(),
            notebook,
            &mut self.archive,
            &mut self.alloc,
        );

        let metadata = NoteMetadata {
            title: Some(title.clone()),
            created: note.ctime.and_then(local_time),
            modified: note.mtime.and_then(local_time),
            notebook: Some(notebook.title.clone()),
            tags: note.tags().to_vec(),
            source_url: note.source_url.clone(),
            location: location(&note, self.ctx).await,
            attachments: Vec::new(),
        };

        let config = self.ctx.config;
        let text = finish_document(&converted, &resolved, &metadata, config);

        match write_note(
            &notebook.dir,
            &title,
            metadata.created.as_ref(),
            &text,
            config,
            &mut self.alloc,
        ) {
            Ok((path, bytes)) => (title, NoteOutcome::Converted { path, bytes }),
            Err(e) => (title, skipped(e)),
        }
    }
}

fn skipped(error: ConvertError) -> NoteOutcome {
    NoteOutcome::Skipped {
        reason: error.to_string(),
    }
}

/// Header location for a note, reverse geocoding coordinates when enabled.
async fn location(note: &NoteRecord, ctx: &ExportContext<'_>) -> Location {
    if let Some(name) = &note.location {
        return Location::Named(name.clone());
    }
    let Some((lat, lon)) = note.coordinates() else {
        return Location::Unknown;
    };

    let header = &ctx.config.header;
    let place = match ctx.geocoder {
        Some(geocoder) if header.enabled && header.location => {
            match geocoder.reverse(lat, lon).await {
                Ok(place) => place.display_name(),
                Err(e) => {
                    warn!(lat, lon, error = %e, "reverse geocoding failed");
                    None
                }
            }
        }
        _ => None,
    };

    Location::Coordinates { lat, lon, place }
}

/// Epoch seconds as local time.
fn local_time(epoch: f64) -> Option<DateTime<Local>> {
    let secs = epoch.trunc() as i64;
    let nanos = (epoch.fract().abs() * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos).map(|utc| utc.with_timezone(&Local))
}
