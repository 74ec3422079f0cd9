//! End-to-end export of archives built on the fly.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use regex::Regex;
use serde_json::{Value, json};
use zip::write::SimpleFileOptions;

use nsxconv_core::{ExportContext, RunReport, SilentProgress, export_archive, export_archives};
use nsxconv_geocode::{Place, ReverseGeocoder};
use nsxconv_markup::MarkupConverter;
use nsxconv_shared::{ConvertError, ExportConfig, MarkupFormat, Result, TRASH_NOTEBOOK_ID};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Deterministic stand-in for pandoc: images become Org links, paragraphs
/// become lines, other tags are dropped. Bodies containing `FAIL` error out.
struct TagStripConverter;

#[async_trait]
impl MarkupConverter for TagStripConverter {
    async fn convert(&self, html: &str) -> Result<String> {
        static IMG_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r#"<img src="([^"]*)"[^>]*>"#).unwrap());
        static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

        if html.contains("FAIL") {
            return Err(ConvertError::Conversion("pandoc exited with 1".into()));
        }
        let text = IMG_RE.replace_all(html, "[[$1]]");
        let text = text.replace("</p>", "\n");
        Ok(TAG_RE.replace_all(&text, "").to_string())
    }

    fn format(&self) -> MarkupFormat {
        MarkupFormat::Org
    }
}

struct FixedGeocoder;

#[async_trait]
impl ReverseGeocoder for FixedGeocoder {
    async fn reverse(&self, _lat: f64, _lon: f64) -> Result<Place> {
        Ok(Place {
            city: Some("Berlin".into()),
            country: Some("Germany".into()),
        })
    }
}

struct FailingGeocoder;

#[async_trait]
impl ReverseGeocoder for FailingGeocoder {
    async fn reverse(&self, _lat: f64, _lon: f64) -> Result<Place> {
        Err(ConvertError::Geocode("service unavailable".into()))
    }
}

struct Workspace {
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let root = std::env::temp_dir().join(format!("nsx-e2e-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    fn out(&self) -> PathBuf {
        self.root.join("out")
    }

    /// Write an archive with a manifest, JSON records, and raw blobs.
    fn archive(
        &self,
        name: &str,
        notebooks: &[(&str, Value)],
        notes: &[(&str, Value)],
        blobs: &[(&str, &[u8])],
    ) -> PathBuf {
        let path = self.root.join(name);
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        let opts = SimpleFileOptions::default();

        let manifest = json!({
            "notebook": notebooks.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            "note": notes.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        });
        zip.start_file("config.json", opts).unwrap();
        zip.write_all(manifest.to_string().as_bytes()).unwrap();

        for (id, record) in notebooks.iter().chain(notes) {
            zip.start_file(*id, opts).unwrap();
            zip.write_all(record.to_string().as_bytes()).unwrap();
        }
        for (md5, data) in blobs {
            zip.start_file(format!("file_{md5}"), opts).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
        path
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

async fn run(archive: &Path, dest: &Path, config: &ExportConfig) -> RunReport {
    run_with(archive, dest, config, None).await
}

async fn run_with(
    archive: &Path,
    dest: &Path,
    config: &ExportConfig,
    geocoder: Option<&dyn ReverseGeocoder>,
) -> RunReport {
    let ctx = ExportContext {
        config,
        converter: &TagStripConverter,
        geocoder,
        progress: &SilentProgress,
    };
    export_archive(archive, dest, &ctx).await.unwrap()
}

fn work() -> (&'static str, Value) {
    ("nb_work", json!({"title": "Work"}))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_note_lands_in_its_notebook() {
    let ws = Workspace::new();
    let archive = ws.archive(
        "export.nsx",
        &[work()],
        &[(
            "n1",
            json!({"title": "Hello", "parent_id": "nb_work", "content": "<p>Hi</p>"}),
        )],
        &[],
    );

    let report = run(&archive, &ws.out(), &ExportConfig::default()).await;

    let written = std::fs::read_to_string(ws.out().join("Work").join("Hello.org")).unwrap();
    assert_eq!(
        written,
        "#+title: Hello\n#+notebook: Work\n#+filetags: :note station:\n\nHi\n"
    );
    assert!(!ws.out().join("Work").join("media").exists());
    assert!(!ws.out().join("Recycle bin").exists());

    assert_eq!(report.converted_count(), 1);
    assert!(!report.has_failures());
    assert_eq!(report.summary_line(), "Converted 1 notebook and 1 out of 1 notes.");
}

#[tokio::test]
async fn duplicate_titles_get_numbered_files() {
    let ws = Workspace::new();
    let note = json!({"title": "Dup", "parent_id": "nb_work", "content": "<p>x</p>"});
    let archive = ws.archive(
        "dup.nsx",
        &[work()],
        &[("n1", note.clone()), ("n2", note)],
        &[],
    );

    let report = run(&archive, &ws.out(), &ExportConfig::default()).await;

    assert!(ws.out().join("Work").join("Dup.org").is_file());
    assert!(ws.out().join("Work").join("Dup_1.org").is_file());
    assert_eq!(report.converted_count(), 2);
}

#[tokio::test]
async fn missing_blob_without_source_is_marked_not_found() {
    let ws = Workspace::new();
    let archive = ws.archive(
        "missing.nsx",
        &[work()],
        &[(
            "n1",
            json!({
                "title": "Report",
                "parent_id": "nb_work",
                "content": "<p>See attached</p>",
                "attachment": {"a1": {"md5": "deadbeef", "name": "lost.pdf"}}
            }),
        )],
        &[],
    );

    let report = run(&archive, &ws.out(), &ExportConfig::default()).await;

    let written = std::fs::read_to_string(ws.out().join("Work").join("Report.org")).unwrap();
    assert!(written.contains("#+attachments: [file://media/lost.pdf][NOT FOUND]\n"));
    assert!(written.ends_with("See attached\n"));
    assert_eq!(report.converted_count(), 1);
    assert!(!report.has_failures());
}

#[tokio::test]
async fn inline_images_and_listed_attachments() {
    let ws = Workspace::new();
    let archive = ws.archive(
        "images.nsx",
        &[work()],
        &[(
            "n1",
            json!({
                "title": "Trip",
                "parent_id": "nb_work",
                "content": "<p><img class=\"syno-notestation-image-object\" src=\"webman/transparent.gif\" ref=\"REF_ONE\"></p>",
                "attachment": {
                    "img": {"ref": "REF_ONE", "md5": "m1", "name": "ns_attach_image_1.png"},
                    "doc": {"md5": "m2", "name": "plan.pdf"}
                }
            }),
        )],
        &[("m1", b"png-bytes"), ("m2", b"pdf-bytes")],
    );

    run(&archive, &ws.out(), &ExportConfig::default()).await;

    let media = ws.out().join("Work").join("media");
    assert_eq!(std::fs::read(media.join("1.png")).unwrap(), b"png-bytes");
    assert_eq!(std::fs::read(media.join("plan.pdf")).unwrap(), b"pdf-bytes");

    let written = std::fs::read_to_string(ws.out().join("Work").join("Trip.org")).unwrap();
    assert!(written.contains("[[media/1.png]]"));
    assert!(!written.contains("REF_ONE"));
    assert!(written.contains("#+attachments: [file://media/plan.pdf][plan.pdf]\n"));
    assert_eq!(written.matches("[plan.pdf]").count(), 1);
}

#[tokio::test]
async fn unresolvable_parent_is_reported_not_written() {
    let ws = Workspace::new();
    let archive = ws.archive(
        "orphan.nsx",
        &[work()],
        &[
            (
                "n1",
                json!({"title": "Kept", "parent_id": "nb_work", "content": "<p>a</p>"}),
            ),
            (
                "n2",
                json!({"title": "Orphan", "parent_id": "nb_gone", "content": "<p>b</p>"}),
            ),
            ("n3", json!({"title": "Broken", "parent_id": "nb_work", "content": "<p>FAIL</p>"})),
        ],
        &[],
    );

    let report = run(&archive, &ws.out(), &ExportConfig::default()).await;

    assert!(ws.out().join("Work").join("Kept.org").is_file());
    assert!(!ws.out().join("Work").join("Orphan.org").exists());
    assert!(!ws.out().join("Work").join("Broken.org").exists());

    assert_eq!(report.converted_count(), 1);
    let lines = report.failure_lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "  - Orphan (ID: n2): parent notebook nb_gone not found");
    assert!(lines[1].starts_with("  - Broken (ID: n3): "));
    assert!(report.to_string().starts_with("Failed to convert notes:\n"));
}

#[tokio::test]
async fn trashed_notes_go_to_recycle_bin() {
    let ws = Workspace::new();
    let archive = ws.archive(
        "trash.nsx",
        &[work()],
        &[(
            "n1",
            json!({"title": "Deleted", "parent_id": TRASH_NOTEBOOK_ID, "content": "<p>old</p>"}),
        )],
        &[],
    );

    run(&archive, &ws.out(), &ExportConfig::default()).await;

    let written =
        std::fs::read_to_string(ws.out().join("Recycle bin").join("Deleted.org")).unwrap();
    assert!(written.contains("#+notebook: Recycle bin\n"));
    // the unused notebook directory is cleaned up
    assert!(!ws.out().join("Work").exists());
}

#[tokio::test]
async fn creation_time_prefixes_file_name() {
    let ws = Workspace::new();
    let archive = ws.archive(
        "stamped.nsx",
        &[work()],
        &[(
            "n1",
            json!({
                "title": "Stamped",
                "parent_id": "nb_work",
                "ctime": 1700000000,
                "mtime": 1700003600,
                "tag": ["a b", "c"],
                "source_url": "https://example.com/x",
                "content": "<p>t</p>"
            }),
        )],
        &[],
    );

    run(&archive, &ws.out(), &ExportConfig::default()).await;

    let created: DateTime<Local> = DateTime::from_timestamp(1_700_000_000, 0)
        .unwrap()
        .with_timezone(&Local);
    let file = format!("{}Stamped.org", created.format("%Y%m%dT%H%M%S-"));
    let written = std::fs::read_to_string(ws.out().join("Work").join(file)).unwrap();

    let expected_header = format!(
        "#+title: Stamped\n#+created: {}\n",
        created.format("%Y-%m-%d %H:%M:%S")
    );
    assert!(written.starts_with(&expected_header));
    assert!(written.contains("#+filetags: :a b:c:note station:\n#+link: https://example.com/x\n"));
}

#[tokio::test]
async fn coordinates_are_reverse_geocoded() {
    let ws = Workspace::new();
    let archive = ws.archive(
        "geo.nsx",
        &[work()],
        &[(
            "n1",
            json!({
                "title": "Walk",
                "parent_id": "nb_work",
                "latitude": 52.52,
                "longitude": "13.405",
                "content": "<p>w</p>"
            }),
        )],
        &[],
    );

    run_with(
        &archive,
        &ws.out(),
        &ExportConfig::default(),
        Some(&FixedGeocoder),
    )
    .await;

    let written = std::fs::read_to_string(ws.out().join("Work").join("Walk.org")).unwrap();
    assert!(written.contains("#+location: Berlin Germany\n#+latlon: 52.52 13.405\n"));
}

#[tokio::test]
async fn geocoding_failure_keeps_note_and_coordinates() {
    let ws = Workspace::new();
    let archive = ws.archive(
        "lost.nsx",
        &[work()],
        &[(
            "n1",
            json!({
                "title": "Lost",
                "parent_id": "nb_work",
                "latitude": 1.5,
                "longitude": 2.5,
                "content": "<p>where</p>"
            }),
        )],
        &[],
    );

    let report = run_with(
        &archive,
        &ws.out(),
        &ExportConfig::default(),
        Some(&FailingGeocoder),
    )
    .await;

    assert_eq!(report.converted_count(), 1);
    assert!(!report.has_failures());
    let written = std::fs::read_to_string(ws.out().join("Work").join("Lost.org")).unwrap();
    assert!(!written.contains("#+location:"));
    assert!(written.contains("#+latlon: 1.5 2.5\n"));
    assert!(written.contains("where"));
}

#[tokio::test]
async fn markdown_target_without_header() {
    let ws = Workspace::new();
    let archive = ws.archive(
        "md.nsx",
        &[work()],
        &[(
            "n1",
            json!({
                "title": "Plain",
                "parent_id": "nb_work",
                "content": "<p>body</p>",
                "attachment": {"a": {"md5": "m1", "name": "x.txt"}}
            }),
        )],
        &[("m1", b"x")],
    );

    let mut config = ExportConfig {
        target: MarkupFormat::Markdown,
        file_ext: "md".into(),
        ..ExportConfig::default()
    };
    config.header.enabled = false;
    config.links.as_uri = false;

    run(&archive, &ws.out(), &config).await;

    let written = std::fs::read_to_string(ws.out().join("Work").join("Plain.md")).unwrap();
    assert_eq!(written, "\nbody\n\n[media/x.txt][x.txt]\n");
}

#[tokio::test]
async fn repeated_runs_create_sibling_directories() {
    let ws = Workspace::new();
    let archive = ws.archive(
        "again.nsx",
        &[work()],
        &[(
            "n1",
            json!({"title": "Hello", "parent_id": "nb_work", "content": "<p>Hi</p>"}),
        )],
        &[],
    );

    run(&archive, &ws.out(), &ExportConfig::default()).await;
    run(&archive, &ws.out(), &ExportConfig::default()).await;

    assert!(ws.out().join("Work").join("Hello.org").is_file());
    assert!(ws.out().join("Work_1").join("Hello.org").is_file());
}

#[tokio::test]
async fn unreadable_archives_are_skipped() {
    let ws = Workspace::new();
    let bad = ws.root.join("bad.nsx");
    std::fs::write(&bad, b"not a zip").unwrap();
    let good = ws.archive(
        "good.nsx",
        &[work()],
        &[(
            "n1",
            json!({"title": "Hello", "parent_id": "nb_work", "content": "<p>Hi</p>"}),
        )],
        &[],
    );

    let config = ExportConfig::default();
    let ctx = ExportContext {
        config: &config,
        converter: &TagStripConverter,
        geocoder: None,
        progress: &SilentProgress,
    };
    let reports = export_archives(&[bad, good.clone()], &ws.out(), &ctx)
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].archive, good);
}
