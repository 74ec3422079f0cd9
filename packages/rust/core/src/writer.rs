//! Writes finished documents into notebook directories.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use nsxconv_shared::{ConvertError, ExportConfig, PathAllocator, Result, sanitize_or_untitled};

/// Prefix format for timestamped file names.
const FILENAME_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S-";

/// File stem for a note: optional creation-time prefix, then the sanitized title.
pub fn note_file_stem(title: &str, created: Option<&DateTime<Local>>, config: &ExportConfig) -> String {
    match created {
        Some(ts) if config.date_in_filename => {
            sanitize_or_untitled(&format!("{}{title}", ts.format(FILENAME_TIMESTAMP_FORMAT)))
        }
        _ => sanitize_or_untitled(title),
    }
}

/// Allocate a free path for the note and write `text` to it.
///
/// Returns the path and the number of bytes written. The file is created
/// exclusively, so an existing file is never overwritten.
pub fn write_note(
    dir: &Path,
    title: &str,
    created: Option<&DateTime<Local>>,
    text: &str,
    config: &ExportConfig,
    alloc: &mut PathAllocator,
) -> Result<(PathBuf, usize)> {
    let stem = note_file_stem(title, created, config);
    let path = alloc.allocate(dir, &stem, Some(&config.file_ext));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| ConvertError::io(&path, e))?;
    file.write_all(text.as_bytes())
        .map_err(|e| ConvertError::io(&path, e))?;

    Ok((path, text.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nsx-writer-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn stem_with_and_without_timestamp() {
        let created = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).single().unwrap();
        let config = ExportConfig::default();
        assert_eq!(
            note_file_stem("Plan: Q2", Some(&created), &config),
            "20240309T070501-Plan- Q2"
        );
        assert_eq!(note_file_stem("Plan", None, &config), "Plan");
        assert_eq!(note_file_stem("", None, &config), "Untitled");

        let config = ExportConfig {
            date_in_filename: false,
            ..ExportConfig::default()
        };
        assert_eq!(note_file_stem("Plan", Some(&created), &config), "Plan");
    }

    #[test]
    fn duplicate_titles_get_suffixes() {
        let tmp = temp_dir();
        let config = ExportConfig::default();
        let mut alloc = PathAllocator::new();

        let (first, bytes) = write_note(&tmp, "Dup", None, "one\n", &config, &mut alloc).unwrap();
        let (second, _) = write_note(&tmp, "Dup", None, "two\n", &config, &mut alloc).unwrap();

        assert_eq!(first, tmp.join("Dup.org"));
        assert_eq!(second, tmp.join("Dup_1.org"));
        assert_eq!(bytes, 4);
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "one\n");
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "two\n");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_directory_fails_note() {
        let tmp = temp_dir();
        let mut alloc = PathAllocator::new();
        let err = write_note(
            &tmp.join("gone"),
            "X",
            None,
            "x",
            &ExportConfig::default(),
            &mut alloc,
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
