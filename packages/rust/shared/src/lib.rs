//! Shared types, error model, and configuration for nsxconv.
//!
//! This crate is the foundation depended on by all other nsxconv crates.
//! It provides:
//! - [`ConvertError`], the unified error type
//! - Archive record types ([`ArchiveManifest`], [`NotebookRecord`], [`NoteRecord`])
//! - Configuration ([`AppConfig`], [`ExportConfig`], config loading)
//! - Path sanitizing and collision-free path allocation ([`paths`])

pub mod config;
pub mod error;
pub mod paths;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConverterConfig, ConverterEngine, ExportConfig, GeocodingConfig, HeaderOptions,
    LinkStyle, LinksConfig, MetadataConfig, OutputConfig, TagStyle, TagsConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{ConvertError, Result};
pub use paths::{PathAllocator, UNTITLED, sanitize, sanitize_or_untitled};
pub use types::{
    ArchiveManifest, AttachmentRecord, Attachments, MANIFEST_ENTRY, MarkupFormat, NoteRecord,
    NotebookRecord, TRASH_NOTEBOOK_ID,
};
