//! Metadata header for converted notes.
//!
//! [`build_header_fields`] is a pure function from a [`NoteMetadata`] value
//! to an ordered list of fields; [`render_header`] writes them as Org
//! keywords or as a Markdown YAML front matter block.

use chrono::{DateTime, Local};

use nsxconv_shared::{HeaderOptions, MarkupFormat, TagStyle};

/// Tag appended to every tag line, naming where the note came from.
pub const PROVENANCE_TAG: &str = ":note station:";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Value objects
// ---------------------------------------------------------------------------

/// Where a note was written.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Location {
    #[default]
    Unknown,
    /// A location string stored with the note, used verbatim.
    Named(String),
    /// Raw coordinates, with a place name when reverse geocoding succeeded.
    Coordinates {
        lat: f64,
        lon: f64,
        place: Option<String>,
    },
}

/// Everything the header can show about one note.
#[derive(Debug, Clone, Default)]
pub struct NoteMetadata {
    pub title: Option<String>,
    pub created: Option<DateTime<Local>>,
    pub modified: Option<DateTime<Local>>,
    pub notebook: Option<String>,
    pub tags: Vec<String>,
    pub source_url: Option<String>,
    pub location: Location,
    /// Formatted links of attachments that have no inline reference.
    pub attachments: Vec<String>,
}

/// Header keys, declared in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeaderKey {
    Title,
    Created,
    Modified,
    Notebook,
    Filetags,
    Link,
    Location,
    Latlon,
    Attachments,
}

impl HeaderKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Notebook => "notebook",
            Self::Filetags => "filetags",
            Self::Link => "link",
            Self::Location => "location",
            Self::Latlon => "latlon",
            Self::Attachments => "attachments",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderField {
    pub key: HeaderKey,
    pub value: String,
}

impl HeaderField {
    fn new(key: HeaderKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Build the header fields for a note. Disabled or absent data omits the line.
///
/// The tag line is always present when tags are enabled since it carries the
/// provenance tag.
pub fn build_header_fields(
    meta: &NoteMetadata,
    opts: &HeaderOptions,
    tags: &TagStyle,
) -> Vec<HeaderField> {
    if !opts.enabled {
        return Vec::new();
    }

    let mut fields = Vec::new();

    if opts.title {
        if let Some(title) = meta.title.as_deref().filter(|t| !t.is_empty()) {
            fields.push(HeaderField::new(HeaderKey::Title, title));
        }
    }
    if opts.created {
        if let Some(created) = meta.created {
            fields.push(HeaderField::new(HeaderKey::Created, format_timestamp(&created)));
        }
    }
    if opts.modified {
        if let Some(modified) = meta.modified {
            fields.push(HeaderField::new(HeaderKey::Modified, format_timestamp(&modified)));
        }
    }
    if opts.notebook {
        if let Some(notebook) = &meta.notebook {
            fields.push(HeaderField::new(HeaderKey::Notebook, notebook.as_str()));
        }
    }
    if opts.tags {
        fields.push(HeaderField::new(HeaderKey::Filetags, format_tags(&meta.tags, tags)));
    }
    if opts.source_url {
        if let Some(url) = &meta.source_url {
            fields.push(HeaderField::new(HeaderKey::Link, url.as_str()));
        }
    }
    if opts.location {
        match &meta.location {
            Location::Unknown => {}
            Location::Named(name) => {
                fields.push(HeaderField::new(HeaderKey::Location, name.as_str()));
            }
            Location::Coordinates { lat, lon, place } => {
                if let Some(place) = place {
                    fields.push(HeaderField::new(HeaderKey::Location, place.as_str()));
                }
                fields.push(HeaderField::new(HeaderKey::Latlon, format!("{lat} {lon}")));
            }
        }
    }
    if !meta.attachments.is_empty() {
        fields.push(HeaderField::new(
            HeaderKey::Attachments,
            meta.attachments.join(", "),
        ));
    }

    fields
}

/// `%Y-%m-%d %H:%M:%S` in local time.
pub fn format_timestamp(ts: &DateTime<Local>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn format_tags(tags: &[String], style: &TagStyle) -> String {
    let mut line = tags
        .iter()
        .map(|tag| {
            let tag = if style.replace_spaces {
                tag.replace(' ', "_")
            } else {
                tag.clone()
            };
            format!("{}{tag}", style.prefix)
        })
        .collect::<Vec<_>>()
        .join(&style.delimiter);
    line.push_str(PROVENANCE_TAG);
    line
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render fields in the target markup. No fields render as an empty string.
pub fn render_header(fields: &[HeaderField], format: MarkupFormat) -> String {
    if fields.is_empty() {
        return String::new();
    }

    match format {
        MarkupFormat::Org => fields
            .iter()
            .map(|f| format!("#+{}: {}\n", f.key.as_str(), f.value))
            .collect(),
        MarkupFormat::Markdown => {
            let mut fm = String::from("---\n");
            for f in fields {
                fm.push_str(&format!("{}: \"{}\"\n", f.key.as_str(), escape_yaml_string(&f.value)));
            }
            fm.push_str("---\n");
            fm
        }
    }
}

/// Escape special characters in a YAML string value.
fn escape_yaml_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
