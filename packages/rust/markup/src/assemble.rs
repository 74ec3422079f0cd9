//! Turns a note's HTML body into the final document text.
//!
//! Assembly runs in two stages so attachments can be resolved in between:
//! [`convert_body`] produces cleaned markup, [`finish_document`] splices in
//! attachment links and the metadata header.

use tracing::instrument;

use nsxconv_shared::{ExportConfig, Result};

use crate::cleanup;
use crate::converter::MarkupConverter;
use crate::header::{NoteMetadata, build_header_fields, render_header};

/// A reference token in the converted body and the link that replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineReplacement {
    pub token: String,
    pub target: String,
}

/// Attachment outcome of one note, ready for [`finish_document`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAttachments {
    /// Inline images, replaced in the body.
    pub replacements: Vec<InlineReplacement>,
    /// Formatted links of the remaining attachments, in record order.
    pub listed: Vec<String>,
}

/// Stage one: HTML to cleaned markup.
///
/// Placeholder image tags are rewritten to carry their reference token, the
/// converter runs, and converter escape backslashes are removed.
#[instrument(skip_all, fields(html_len = html.len()))]
pub async fn convert_body(html: &str, converter: &dyn MarkupConverter) -> Result<String> {
    let prepared = cleanup::rewrite_image_markers(html);
    let converted = converter.convert(&prepared).await?;
    Ok(cleanup::run_pipeline(&converted))
}

/// Stage two: the complete document text.
///
/// `metadata.attachments` is ignored in favour of `attachments.listed`.
pub fn finish_document(
    converted: &str,
    attachments: &ResolvedAttachments,
    metadata: &NoteMetadata,
    config: &ExportConfig,
) -> String {
    let mut body = converted.to_string();
    for replacement in &attachments.replacements {
        body = body.replace(&replacement.token, &replacement.target);
    }

    if config.embed_images {
        body = cleanup::strip_file_scheme(&body);
    }

    // decided by the note's data, not by which header fields are rendered
    let separated = metadata.title.as_deref().is_some_and(|t| !t.is_empty())
        || metadata.created.is_some()
        || metadata.modified.is_some()
        || !metadata.tags.is_empty()
        || !attachments.listed.is_empty();

    let mut document = if config.header.enabled {
        let meta = NoteMetadata {
            attachments: attachments.listed.clone(),
            ..metadata.clone()
        };
        let fields = build_header_fields(&meta, &config.header, &config.tags);
        render_header(&fields, config.target)
    } else {
        body = append_attachment_block(body, &attachments.listed);
        String::new()
    };

    if separated {
        document.push('\n');
    }
    document.push_str(&body);
    document
}

/// Without a header the attachment links go to the end of the body.
fn append_attachment_block(mut body: String, listed: &[String]) -> String {
    if listed.is_empty() {
        return body;
    }
    if !body.is_empty() {
        if !body.ends_with('\n') {
            body.push('\n');
        }
        body.push('\n');
    }
    for link in listed {
        body.push_str(link);
        body.push('\n');
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nsxconv_shared::{ConvertError, MarkupFormat};

    /// Wraps the HTML in a fixed frame and escapes underscores like pandoc does.
    struct EchoConverter;

    #[async_trait]
    impl MarkupConverter for EchoConverter {
        async fn convert(&self, html: &str) -> Result<String> {
            Ok(format!("BODY[{}]\n", html.replace('_', "\\_")))
        }

        fn format(&self) -> MarkupFormat {
            MarkupFormat::Org
        }
    }

    struct FailingConverter;

    #[async_trait]
    impl MarkupConverter for FailingConverter {
        async fn convert(&self, _html: &str) -> Result<String> {
            Err(ConvertError::ConverterTimeout { secs: 20 })
        }

        fn format(&self) -> MarkupFormat {
            MarkupFormat::Org
        }
    }

    fn titled(title: &str) -> NoteMetadata {
        NoteMetadata {
            title: Some(title.into()),
            ..NoteMetadata::default()
        }
    }

    #[tokio::test]
    async fn convert_body_rewrites_markers_and_strips_escapes() {
        let html = r#"<img class="syno-notestation-image-object" src="x.gif" ref="TOK_1">"#;
        let out = convert_body(html, &EchoConverter).await.unwrap();
        assert_eq!(out, "BODY[<img src=\"TOK_1\">]\n");
    }

    #[tokio::test]
    async fn convert_body_propagates_converter_errors() {
        let err = convert_body("<p>x</p>", &FailingConverter).await.unwrap_err();
        assert!(matches!(err, ConvertError::ConverterTimeout { .. }));
    }

    #[test]
    fn header_then_blank_line_then_body() {
        let config = ExportConfig::default();
        let doc = finish_document(
            "Hi\n",
            &ResolvedAttachments::default(),
            &titled("Hello"),
            &config,
        );
        assert_eq!(doc, "#+title: Hello\n#+filetags: :note station:\n\nHi\n");
    }

    #[test]
    fn tokens_replaced_everywhere_and_not_listed() {
        let attachments = ResolvedAttachments {
            replacements: vec![InlineReplacement {
                token: "TOK".into(),
                target: "file://media/a.png".into(),
            }],
            listed: vec!["[file://media/doc.pdf][doc.pdf]".into()],
        };
        let config = ExportConfig::default();
        let doc = finish_document("[[TOK]] and [[TOK]]\n", &attachments, &titled("T"), &config);

        assert!(doc.contains("[[media/a.png]] and [[media/a.png]]"));
        assert!(!doc.contains("TOK"));
        // header keeps the scheme, only the body is rewritten
        assert!(doc.contains("#+attachments: [file://media/doc.pdf][doc.pdf]\n"));
    }

    #[test]
    fn embedding_off_keeps_scheme() {
        let attachments = ResolvedAttachments {
            replacements: vec![InlineReplacement {
                token: "TOK".into(),
                target: "file://media/a.png".into(),
            }],
            listed: Vec::new(),
        };
        let config = ExportConfig {
            embed_images: false,
            ..ExportConfig::default()
        };
        let doc = finish_document("[[TOK]]\n", &attachments, &titled("T"), &config);
        assert!(doc.contains("[[file://media/a.png]]"));
    }

    #[test]
    fn header_disabled_appends_attachment_block() {
        let mut config = ExportConfig::default();
        config.header.enabled = false;
        let attachments = ResolvedAttachments {
            replacements: Vec::new(),
            listed: vec!["[media/a.pdf][a.pdf]".into(), "[media/b.pdf][b.pdf]".into()],
        };
        let doc = finish_document("Body", &attachments, &titled("T"), &config);
        assert_eq!(doc, "\nBody\n\n[media/a.pdf][a.pdf]\n[media/b.pdf][b.pdf]\n");

        let bare = finish_document("Body\n", &ResolvedAttachments::default(), &NoteMetadata::default(), &config);
        assert_eq!(bare, "Body\n");
    }

    #[test]
    fn blank_line_follows_note_data_not_enabled_fields() {
        let tagged = NoteMetadata {
            tags: vec!["work".into()],
            ..NoteMetadata::default()
        };

        let mut config = ExportConfig::default();
        config.header.enabled = false;
        let doc = finish_document("body\n", &ResolvedAttachments::default(), &tagged, &config);
        assert_eq!(doc, "\nbody\n");

        let mut config = ExportConfig::default();
        config.header.tags = false;
        let doc = finish_document("body\n", &ResolvedAttachments::default(), &tagged, &config);
        assert_eq!(doc, "\nbody\n");
    }

    #[test]
    fn no_separator_without_leading_fields() {
        let mut config = ExportConfig::default();
        config.header.title = false;
        config.header.tags = false;
        let meta = NoteMetadata {
            notebook: Some("Work".into()),
            ..NoteMetadata::default()
        };
        let doc = finish_document("Hi\n", &ResolvedAttachments::default(), &meta, &config);
        assert_eq!(doc, "#+notebook: Work\nHi\n");
    }
}
