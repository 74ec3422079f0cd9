//! Record types decoded from an `.nsx` export archive.

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

/// Name of the manifest entry at the root of every archive.
pub const MANIFEST_ENTRY: &str = "config.json";

/// Parent identifier the exporting application uses for deleted notes.
pub const TRASH_NOTEBOOK_ID: &str = "1027_#00000000";

// ---------------------------------------------------------------------------
// MarkupFormat
// ---------------------------------------------------------------------------

/// Target markup of the produced documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkupFormat {
    #[default]
    Org,
    Markdown,
}

impl MarkupFormat {
    /// File extension used for documents in this format.
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Org => "org",
            Self::Markdown => "md",
        }
    }

    /// Writer name understood by pandoc's `-t` flag.
    pub fn pandoc_writer(&self) -> &'static str {
        match self {
            Self::Org => "org",
            Self::Markdown => "gfm",
        }
    }
}

impl fmt::Display for MarkupFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Org => write!(f, "org"),
            Self::Markdown => write!(f, "markdown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest and records
// ---------------------------------------------------------------------------

/// The `config.json` manifest listing everything in the archive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveManifest {
    /// Notebook identifiers, in export order.
    #[serde(default)]
    pub notebook: Vec<String>,
    /// Note identifiers, in export order.
    #[serde(default)]
    pub note: Vec<String>,
}

/// A notebook record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotebookRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
}

/// A note record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteRecord {
    #[serde(default)]
    pub title: Option<String>,
    /// Creation time, seconds since the epoch.
    #[serde(default, deserialize_with = "lenient_number")]
    pub ctime: Option<f64>,
    /// Modification time, seconds since the epoch.
    #[serde(default, deserialize_with = "lenient_number")]
    pub mtime: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub source_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub tag: Option<Vec<String>>,
    /// HTML body fragment.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachments>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl NoteRecord {
    /// Tags, or an empty slice when the record has none.
    pub fn tags(&self) -> &[String] {
        self.tag.as_deref().unwrap_or_default()
    }

    /// Attachment entries in archive order.
    pub fn attachments(&self) -> &[(String, AttachmentRecord)] {
        self.attachment
            .as_ref()
            .map(|a| a.0.as_slice())
            .unwrap_or_default()
    }

    /// Latitude/longitude pair when the note carries a usable position.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// One entry of a note's attachment map.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AttachmentRecord {
    /// In-body reference token, present for inline images.
    #[serde(default, rename = "ref", deserialize_with = "lenient_opt_string")]
    pub reference: Option<String>,
    /// Content hash; the blob lives in entry `file_<md5>`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub md5: String,
    /// External URL the attachment originally came from.
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
}

/// Attachment map of a note, kept in the order the archive lists it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attachments(pub Vec<(String, AttachmentRecord)>);

impl<'de> Deserialize<'de> for Attachments {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = Attachments;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of attachment records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Attachments, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((id, record)) = map.next_entry::<String, AttachmentRecord>()? {
                    entries.push((id, record));
                }
                Ok(Attachments(entries))
            }

            // Some exports write an empty list instead of an empty map.
            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Attachments, A::Error> {
                while seq.next_element::<de::IgnoredAny>()?.is_some() {}
                Ok(Attachments::default())
            }
        }

        deserializer.deserialize_any(OrderedVisitor)
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

/// Accept a number or a numeric string; empty strings, `null`, and zero are absent.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| *n != 0.0 && n.is_finite()))
}

/// Accept a string; `null` and empty strings are absent.
fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Accept a string or `null` (as empty).
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
