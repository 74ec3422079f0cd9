//! Read access to `.nsx` export archives.
//!
//! An archive is a zip container. The `config.json` manifest lists notebook
//! and note identifiers; each identifier names a JSON entry, and attachment
//! blobs live in entries named `file_<md5>`. Records are decoded lazily so a
//! broken note only fails itself.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use zip::ZipArchive;
use zip::result::ZipError;

use nsxconv_shared::{
    ArchiveManifest, ConvertError, MANIFEST_ENTRY, NoteRecord, NotebookRecord, Result,
};

/// File extension of export archives.
pub const ARCHIVE_EXTENSION: &str = "nsx";

/// Prefix of the entries holding attachment blobs.
const BLOB_PREFIX: &str = "file_";

/// Entry name holding the blob with the given content hash.
pub fn blob_entry_name(md5: &str) -> String {
    format!("{BLOB_PREFIX}{md5}")
}

// ---------------------------------------------------------------------------
// BlobSource
// ---------------------------------------------------------------------------

/// Anything attachment bytes can be fetched from by content hash.
pub trait BlobSource {
    fn read_blob(&mut self, md5: &str) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// NsxArchive
// ---------------------------------------------------------------------------

/// An opened export archive.
///
/// Owned by the pipeline for the duration of one input file and closed on drop.
pub struct NsxArchive {
    path: PathBuf,
    zip: ZipArchive<BufReader<File>>,
    manifest: ArchiveManifest,
}

impl std::fmt::Debug for NsxArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NsxArchive")
            .field("path", &self.path)
            .field("entries", &self.zip.len())
            .finish()
    }
}

impl NsxArchive {
    /// Open an archive and decode its manifest.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ConvertError::archive(path, e.to_string()))?;
        let mut zip = ZipArchive::new(BufReader::new(file))
            .map_err(|e| ConvertError::archive(path, format!("not a zip container: {e}")))?;

        let raw = read_zip_entry(&mut zip, MANIFEST_ENTRY)
            .map_err(|e| ConvertError::archive(path, format!("{MANIFEST_ENTRY}: {e}")))?;
        let manifest: ArchiveManifest = serde_json::from_slice(&raw)
            .map_err(|e| ConvertError::archive(path, format!("{MANIFEST_ENTRY}: {e}")))?;

        debug!(
            entries = zip.len(),
            notebooks = manifest.notebook.len(),
            notes = manifest.note.len(),
            "archive opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            zip,
            manifest,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &ArchiveManifest {
        &self.manifest
    }

    /// Raw bytes of a named entry.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        read_zip_entry(&mut self.zip, name).map_err(|e| ConvertError::record(name, e.to_string()))
    }

    /// A record decoded as untyped JSON.
    pub fn raw_record(&mut self, id: &str) -> Result<serde_json::Value> {
        self.record(id)
    }

    /// The notebook record with this identifier.
    pub fn notebook(&mut self, id: &str) -> Result<NotebookRecord> {
        self.record(id)
    }

    /// The note record with this identifier.
    pub fn note(&mut self, id: &str) -> Result<NoteRecord> {
        self.record(id)
    }

    fn record<T: DeserializeOwned>(&mut self, id: &str) -> Result<T> {
        let raw = self.read_entry(id)?;
        serde_json::from_slice(&raw).map_err(|e| ConvertError::record(id, e.to_string()))
    }
}

impl BlobSource for NsxArchive {
    fn read_blob(&mut self, md5: &str) -> Result<Vec<u8>> {
        self.read_entry(&blob_entry_name(md5))
    }
}

fn read_zip_entry(zip: &mut ZipArchive<BufReader<File>>, name: &str) -> std::io::Result<Vec<u8>> {
    let mut entry = zip.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => {
            std::io::Error::new(std::io::ErrorKind::NotFound, "entry not found in archive")
        }
        ZipError::Io(io) => io,
        other => std::io::Error::other(other),
    })?;

    let mut buf = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Every `*.nsx` file directly inside `dir`, sorted by file name.
///
/// Returns [`ConvertError::NoArchives`] when there are none.
pub fn discover_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConvertError::io(dir, e))?;

    let mut archives: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
        })
        .collect();

    if archives.is_empty() {
        return Err(ConvertError::NoArchives {
            dir: dir.to_path_buf(),
        });
    }

    archives.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(archives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nsx-archive-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn open_reads_manifest_and_records() {
        let tmp = temp_dir();
        let path = tmp.join("export.nsx");
        write_zip(
            &path,
            &[
                ("config.json", br#"{"notebook": ["nb1"], "note": ["n1", "n2"]}"#),
                ("nb1", br#"{"title": "Work"}"#),
                ("n1", br#"{"title": "Hello", "parent_id": "nb1", "content": "<p>Hi</p>"}"#),
                ("n2", b"{not json"),
                ("file_abc", b"\x89PNG"),
            ],
        );

        let mut archive = NsxArchive::open(&path).unwrap();
        assert_eq!(archive.manifest().notebook, vec!["nb1"]);
        assert_eq!(archive.manifest().note, vec!["n1", "n2"]);
        assert_eq!(archive.notebook("nb1").unwrap().title, "Work");

        let note = archive.note("n1").unwrap();
        assert_eq!(note.title.as_deref(), Some("Hello"));
        assert_eq!(note.parent_id.as_deref(), Some("nb1"));

        // a broken record fails alone
        let err = archive.note("n2").unwrap_err();
        assert!(matches!(err, ConvertError::Record { ref id, .. } if id == "n2"));
        assert!(archive.raw_record("n1").unwrap().is_object());

        assert_eq!(archive.read_blob("abc").unwrap(), b"\x89PNG");
        assert!(archive.read_blob("missing").is_err());
        assert_eq!(archive.read_entry("file_abc").unwrap(), b"\x89PNG");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn open_rejects_non_zip() {
        let tmp = temp_dir();
        let path = tmp.join("broken.nsx");
        std::fs::write(&path, b"plain text").unwrap();

        let err = NsxArchive::open(&path).unwrap_err();
        assert!(matches!(err, ConvertError::ArchiveUnreadable { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn open_rejects_missing_manifest() {
        let tmp = temp_dir();
        let path = tmp.join("nomanifest.nsx");
        write_zip(&path, &[("n1", b"{}")]);

        let err = NsxArchive::open(&path).unwrap_err();
        assert!(err.to_string().contains("config.json"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn discover_archives_sorted() {
        let tmp = temp_dir();
        std::fs::write(tmp.join("b.nsx"), b"").unwrap();
        std::fs::write(tmp.join("a.NSX"), b"").unwrap();
        std::fs::write(tmp.join("notes.txt"), b"").unwrap();
        std::fs::create_dir(tmp.join("dir.nsx")).unwrap();

        let found = discover_archives(&tmp).unwrap();
        assert_eq!(found, vec![tmp.join("a.NSX"), tmp.join("b.nsx")]);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn discover_archives_empty_dir() {
        let tmp = temp_dir();
        let err = discover_archives(&tmp).unwrap_err();
        assert!(matches!(err, ConvertError::NoArchives { .. }));
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
