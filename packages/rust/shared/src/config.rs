//! Application configuration for nsxconv.
//!
//! User config lives at `~/.nsxconv/nsxconv.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::paths::sanitize_or_untitled;
use crate::types::MarkupFormat;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "nsxconv.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".nsxconv";

// ---------------------------------------------------------------------------
// Config structs (matching nsxconv.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Output layout and document format.
    #[serde(default)]
    pub output: OutputConfig,

    /// Which metadata header fields to emit.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Tag formatting inside the header.
    #[serde(default)]
    pub tags: TagsConfig,

    /// Attachment link style.
    #[serde(default)]
    pub links: LinksConfig,

    /// External markup converter.
    #[serde(default)]
    pub converter: ConverterConfig,

    /// Reverse geocoding of note coordinates.
    #[serde(default)]
    pub geocoding: GeocodingConfig,
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Destination root; notebook directories are created inside it.
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Name of the per-notebook attachment directory.
    #[serde(default = "default_media_dir")]
    pub media_dir: String,

    /// Target markup.
    #[serde(default)]
    pub target: MarkupFormat,

    /// Document extension; defaults to the target's usual extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,

    /// Prefix file names with the note's creation time.
    #[serde(default = "default_true")]
    pub date_in_filename: bool,

    /// Drop the `file://` scheme so local images render inline.
    #[serde(default = "default_true")]
    pub embed_images: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            media_dir: default_media_dir(),
            target: MarkupFormat::default(),
            extension: None,
            date_in_filename: true,
            embed_images: true,
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}
fn default_media_dir() -> String {
    "media".into()
}
fn default_true() -> bool {
    true
}

/// `[metadata]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Emit the metadata header at all.
    #[serde(default = "default_true")]
    pub header: bool,
    #[serde(default = "default_true")]
    pub title: bool,
    #[serde(default = "default_true")]
    pub created: bool,
    #[serde(default = "default_true")]
    pub modified: bool,
    #[serde(default = "default_true")]
    pub notebook: bool,
    #[serde(default = "default_true")]
    pub tags: bool,
    #[serde(default = "default_true")]
    pub source_url: bool,
    #[serde(default = "default_true")]
    pub location: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            header: true,
            title: true,
            created: true,
            modified: true,
            notebook: true,
            tags: true,
            source_url: true,
            location: true,
        }
    }
}

/// `[tags]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsConfig {
    /// String prepended to each tag.
    #[serde(default = "default_tag_prefix")]
    pub prefix: String,

    /// String placed between tags.
    #[serde(default)]
    pub delimiter: String,

    /// Replace spaces inside tag names with `_`.
    #[serde(default)]
    pub replace_spaces: bool,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            prefix: default_tag_prefix(),
            delimiter: String::new(),
            replace_spaces: false,
        }
    }
}

fn default_tag_prefix() -> String {
    ":".into()
}

/// `[links]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// `file://` URIs instead of bare paths.
    #[serde(default = "default_true")]
    pub as_uri: bool,

    /// Absolute instead of notebook-relative paths.
    #[serde(default)]
    pub absolute: bool,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            as_uri: true,
            absolute: false,
        }
    }
}

/// Which converter turns note HTML into the target markup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterEngine {
    /// External pandoc process.
    #[default]
    Pandoc,
    /// In-process HTML to Markdown conversion (Markdown target only).
    Builtin,
}

/// `[converter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default)]
    pub engine: ConverterEngine,

    /// Program name or path of the pandoc binary.
    #[serde(default = "default_program")]
    pub program: String,

    /// Budget for one conversion, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional pandoc Lua filter (applied for pandoc >= 2.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lua_filter: Option<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            engine: ConverterEngine::default(),
            program: default_program(),
            timeout_secs: default_timeout_secs(),
            lua_filter: None,
        }
    }
}

fn default_program() -> String {
    "pandoc".into()
}
fn default_timeout_secs() -> u64 {
    20
}

/// `[geocoding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// Resolve coordinates to a place name.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reverse geocoding endpoint (Nominatim compatible).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Minimum ms between two lookups.
    #[serde(default = "default_min_delay")]
    pub min_delay_ms: u64,

    /// HTTP timeout per lookup, in seconds.
    #[serde(default = "default_geocode_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            min_delay_ms: default_min_delay(),
            timeout_secs: default_geocode_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "https://nominatim.openstreetmap.org/reverse".into()
}
fn default_min_delay() -> u64 {
    1000
}
fn default_geocode_timeout() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Export config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Enabled header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderOptions {
    pub enabled: bool,
    pub title: bool,
    pub created: bool,
    pub modified: bool,
    pub notebook: bool,
    pub tags: bool,
    pub source_url: bool,
    pub location: bool,
}

impl Default for HeaderOptions {
    fn default() -> Self {
        Self::from(&MetadataConfig::default())
    }
}

impl From<&MetadataConfig> for HeaderOptions {
    fn from(m: &MetadataConfig) -> Self {
        Self {
            enabled: m.header,
            title: m.title,
            created: m.created,
            modified: m.modified,
            notebook: m.notebook,
            tags: m.tags,
            source_url: m.source_url,
            location: m.location,
        }
    }
}

/// How tags are rendered on the `filetags` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagStyle {
    pub prefix: String,
    pub delimiter: String,
    pub replace_spaces: bool,
}

impl Default for TagStyle {
    fn default() -> Self {
        Self::from(&TagsConfig::default())
    }
}

impl From<&TagsConfig> for TagStyle {
    fn from(t: &TagsConfig) -> Self {
        Self {
            prefix: t.prefix.clone(),
            delimiter: t.delimiter.clone(),
            replace_spaces: t.replace_spaces,
        }
    }
}

/// How attachment links are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStyle {
    pub as_uri: bool,
    pub absolute: bool,
}

/// Immutable runtime configuration passed to every pipeline component.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Sanitized media directory name.
    pub media_dir_name: String,
    /// Document extension, without the dot.
    pub file_ext: String,
    pub target: MarkupFormat,
    pub date_in_filename: bool,
    pub embed_images: bool,
    pub header: HeaderOptions,
    pub tags: TagStyle,
    pub links: LinkStyle,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ExportConfig {
    fn from(config: &AppConfig) -> Self {
        let target = config.output.target;
        let file_ext = config
            .output
            .extension
            .as_deref()
            .map(|e| e.trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .unwrap_or(target.default_extension())
            .to_string();

        Self {
            media_dir_name: sanitize_or_untitled(&config.output.media_dir),
            file_ext,
            target,
            date_in_filename: config.output.date_in_filename,
            embed_images: config.output.embed_images,
            header: HeaderOptions::from(&config.metadata),
            tags: TagStyle::from(&config.tags),
            links: LinkStyle {
                as_uri: config.links.as_uri,
                absolute: config.links.absolute,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.nsxconv/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ConvertError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.nsxconv/nsxconv.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ConvertError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    if config.converter.engine == ConverterEngine::Builtin
        && config.output.target != MarkupFormat::Markdown
    {
        return Err(ConvertError::config(
            "the builtin converter only produces markdown; set output.target = \"markdown\"",
        ));
    }

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ConvertError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ConvertError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ConvertError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("media_dir"));
        assert!(toml_str.contains("nominatim"));
        assert!(toml_str.contains("timeout_secs = 20"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r##"
[output]
target = "markdown"
date_in_filename = false

[tags]
prefix = "#"
delimiter = " "
"##;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.output.target, MarkupFormat::Markdown);
        assert!(!config.output.date_in_filename);
        assert_eq!(config.output.media_dir, "media");
        assert_eq!(config.tags.prefix, "#");
        assert!(config.metadata.header);
        assert_eq!(config.converter.program, "pandoc");
    }

    #[test]
    fn export_config_from_app_config() {
        let mut app = AppConfig::default();
        app.output.media_dir = "my:media".into();
        app.links.absolute = true;

        let export = ExportConfig::from(&app);
        assert_eq!(export.media_dir_name, "my-media");
        assert_eq!(export.file_ext, "org");
        assert!(export.links.as_uri);
        assert!(export.links.absolute);
        assert!(export.header.enabled);
    }

    #[test]
    fn export_config_extension_override() {
        let mut app = AppConfig::default();
        app.output.target = MarkupFormat::Markdown;
        assert_eq!(ExportConfig::from(&app).file_ext, "md");

        app.output.extension = Some(".markdown".into());
        assert_eq!(ExportConfig::from(&app).file_ext, "markdown");
    }

    #[test]
    fn builtin_engine_requires_markdown_target() {
        let path = std::env::temp_dir().join(format!("nsxconv-cfg-{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&path, "[converter]\nengine = \"builtin\"\n").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("builtin converter"));

        let _ = std::fs::remove_file(&path);
    }
}
