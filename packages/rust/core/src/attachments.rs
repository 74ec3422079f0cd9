//! Copies attachment blobs into notebook media directories and decides how
//! each one is linked from its note.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, warn};
use url::Url;

use nsxconv_archive::BlobSource;
use nsxconv_markup::{InlineReplacement, ResolvedAttachments};
use nsxconv_shared::{
    AttachmentRecord, ConvertError, LinkStyle, PathAllocator, Result, UNTITLED, sanitize,
};

use crate::notebooks::NotebookDir;

/// Prefix the exporter gives pasted images.
const IMAGE_NAME_PREFIX: &str = "ns_attach_image_";

/// Label used instead of the name when the blob is missing.
pub const NOT_FOUND_LABEL: &str = "NOT FOUND";

/// Characters kept verbatim in relative `file://` links.
const URL_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Per-archive attachment state.
#[derive(Debug)]
pub struct AttachmentResolver {
    links: LinkStyle,
    media_dir_name: String,
    /// (media dir, md5, display name) → file already written this run.
    written: HashMap<(PathBuf, String, String), PathBuf>,
}

impl AttachmentResolver {
    pub fn new(links: LinkStyle, media_dir_name: impl Into<String>) -> Self {
        Self {
            links,
            media_dir_name: media_dir_name.into(),
            written: HashMap::new(),
        }
    }

    /// Resolve every attachment of one note, in record order. Never fails.
    pub fn resolve(
        &mut self,
        note_title: &str,
        attachments: &[(String, AttachmentRecord)],
        notebook: &NotebookDir,
        blobs: &mut dyn BlobSource,
        alloc: &mut PathAllocator,
    ) -> ResolvedAttachments {
        let mut resolved = ResolvedAttachments::default();

        for (id, attachment) in attachments {
            let display = display_name(&attachment.name);
            let key = (
                notebook.media_dir.clone(),
                attachment.md5.clone(),
                display.clone(),
            );

            let (path, stored) = match self.written.get(&key) {
                Some(path) => (path.clone(), Ok(())),
                None => {
                    let path = alloc.allocate_file(&notebook.media_dir, &display);
                    let stored = store_blob(blobs, &attachment.md5, &path);
                    if stored.is_ok() {
                        self.written.insert(key, path.clone());
                    }
                    (path, stored)
                }
            };

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| display.clone());
            let link = self.local_link(&notebook.media_dir, &file_name);
            let source = attachment.source.as_deref();

            let formatted = match (&stored, source) {
                (Ok(()), _) => format!("[{link}][{file_name}]"),
                (Err(e), Some(source)) => {
                    debug!(attachment = %id, error = %e, "blob unavailable, linking source");
                    format!("[{source}][{file_name}]")
                }
                (Err(e), None) => {
                    warn!(
                        note = %note_title,
                        attachment = %file_name,
                        error = %e,
                        "can't find attachment"
                    );
                    format!("[{link}][{NOT_FOUND_LABEL}]")
                }
            };

            match attachment.reference.as_deref() {
                Some(token) => resolved.replacements.push(InlineReplacement {
                    token: token.to_string(),
                    target: source.map(str::to_string).unwrap_or(link),
                }),
                None => resolved.listed.push(formatted),
            }
        }

        resolved
    }

    /// Link to a file in a media directory, in the configured style.
    pub fn local_link(&self, media_dir: &Path, file_name: &str) -> String {
        match (self.links.as_uri, self.links.absolute) {
            (true, true) => {
                let path = absolute(&media_dir.join(file_name));
                Url::from_file_path(&path)
                    .map(|url| url.to_string())
                    .unwrap_or_else(|()| format!("file://{}", path.display()))
            }
            (true, false) => format!(
                "file://{}/{}",
                utf8_percent_encode(&self.media_dir_name, URL_SEGMENT),
                utf8_percent_encode(file_name, URL_SEGMENT)
            ),
            (false, true) => absolute(&media_dir.join(file_name)).display().to_string(),
            (false, false) => format!("{}/{file_name}", self.media_dir_name),
        }
    }
}

/// Sanitized attachment name without the pasted-image prefix.
fn display_name(name: &str) -> String {
    let name = sanitize(name).replace(IMAGE_NAME_PREFIX, "");
    if name.is_empty() {
        UNTITLED.to_string()
    } else {
        name
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Copy one blob to `path`, never overwriting an existing file.
fn store_blob(blobs: &mut dyn BlobSource, md5: &str, path: &Path) -> Result<()> {
    let bytes = blobs.read_blob(md5)?;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| ConvertError::io(path, e))?;
    file.write_all(&bytes).map_err(|e| ConvertError::io(path, e))?;
    debug!(path = %path.display(), bytes = bytes.len(), "attachment written");
    Ok(())
}
