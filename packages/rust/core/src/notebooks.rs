//! Notebook identifier → output directory index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use nsxconv_archive::NsxArchive;
use nsxconv_shared::{
    ConvertError, NotebookRecord, PathAllocator, Result, TRASH_NOTEBOOK_ID, UNTITLED,
    sanitize_or_untitled,
};

/// Directory name used for the exporter's trash notebook.
pub const RECYCLE_BIN: &str = "Recycle bin";

/// Where one notebook's notes and attachments go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookDir {
    /// Display title, shown in note headers.
    pub title: String,
    pub dir: PathBuf,
    pub media_dir: PathBuf,
}

/// Resolves notebook identifiers to their allocated directories.
#[derive(Debug, Default)]
pub struct NotebookIndex {
    entries: HashMap<String, NotebookDir>,
    /// Allocation order, used for cleanup.
    order: Vec<String>,
}

impl NotebookIndex {
    /// Allocate and create the directories for every notebook of an archive.
    pub fn build(
        archive: &mut NsxArchive,
        dest_root: &Path,
        media_dir_name: &str,
        alloc: &mut PathAllocator,
    ) -> Result<Self> {
        let ids = archive.manifest().notebook.clone();
        Self::build_from(&ids, |id| archive.notebook(id), dest_root, media_dir_name, alloc)
    }

    /// [`NotebookIndex::build`] over any record source.
    ///
    /// The trash directory is allocated first; failing to create it fails the
    /// archive. An unreadable or uncreatable notebook is logged and left
    /// unresolved, so its notes are reported as failed.
    pub fn build_from(
        ids: &[String],
        mut read: impl FnMut(&str) -> Result<NotebookRecord>,
        dest_root: &Path,
        media_dir_name: &str,
        alloc: &mut PathAllocator,
    ) -> Result<Self> {
        let mut index = Self::default();

        let trash = create_notebook_dir(RECYCLE_BIN, RECYCLE_BIN, dest_root, media_dir_name, alloc)?;
        index.insert(TRASH_NOTEBOOK_ID, trash);

        for id in ids {
            let record = match read(id) {
                Ok(record) => record,
                Err(e) => {
                    warn!(notebook = %id, error = %e, "skipping unreadable notebook");
                    continue;
                }
            };

            let title = if record.title.is_empty() {
                UNTITLED.to_string()
            } else {
                record.title
            };

            match create_notebook_dir(&title, &sanitize_or_untitled(&title), dest_root, media_dir_name, alloc) {
                Ok(dir) => {
                    debug!(notebook = %id, dir = %dir.dir.display(), "notebook directory created");
                    index.insert(id, dir);
                }
                Err(e) => warn!(notebook = %id, error = %e, "could not create notebook directory"),
            }
        }

        Ok(index)
    }

    fn insert(&mut self, id: &str, dir: NotebookDir) {
        if self.entries.insert(id.to_string(), dir).is_none() {
            self.order.push(id.to_string());
        }
    }

    pub fn get(&self, id: &str) -> Option<&NotebookDir> {
        self.entries.get(id)
    }

    /// Number of resolved notebooks, trash included.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove empty media directories, then empty notebook directories.
    ///
    /// Best effort: anything non-empty or otherwise unremovable stays.
    pub fn remove_empty_dirs(&self) {
        let dirs = || self.order.iter().filter_map(|id| self.entries.get(id));

        for nb in dirs() {
            if std::fs::remove_dir(&nb.media_dir).is_ok() {
                debug!(dir = %nb.media_dir.display(), "removed empty media directory");
            }
        }
        for nb in dirs() {
            if std::fs::remove_dir(&nb.dir).is_ok() {
                debug!(dir = %nb.dir.display(), "removed empty notebook directory");
            }
        }
    }
}

fn create_notebook_dir(
    title: &str,
    dir_name: &str,
    dest_root: &Path,
    media_dir_name: &str,
    alloc: &mut PathAllocator,
) -> Result<NotebookDir> {
    let dir = alloc.allocate(dest_root, dir_name, None);
    let media_dir = dir.join(media_dir_name);
    std::fs::create_dir_all(&media_dir).map_err(|e| ConvertError::io(&media_dir, e))?;

    Ok(NotebookDir {
        title: title.to_string(),
        dir,
        media_dir,
    })
}
