//! Document sources: turn a [`DocumentHandle`] into plain text.
//!
//! Three readers are provided ([`PdfSource`], [`WebSource`] and
//! [`TextFileSource`]) plus [`AutoSource`], which picks one from the
//! handle's kind. Unreadable pages or sections are skipped and reported in
//! [`ExtractedDocument::skipped`]; only a document that cannot be opened at
//! all (or yields no text) fails with `SourceUnavailable`.

mod html;
mod pdf;
mod web;

use async_trait::async_trait;
use tracing::{debug, instrument};

use docent_shared::{DocentError, DocumentHandle, DocumentKind, Result};

pub use pdf::PdfSource;
pub use web::WebSource;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Text extracted from one document.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    /// Concatenated readable text.
    pub text: String,
    /// Title, when the source format carries one.
    pub title: Option<String>,
    /// Pages or sections that contributed text.
    pub sections_read: usize,
    /// Pages or sections that were skipped.
    pub skipped: Vec<SkippedSection>,
}

/// A page or section that could not be decoded.
#[derive(Debug, Clone)]
pub struct SkippedSection {
    /// 1-based page number, or 0 for a whole-document section.
    pub index: u32,
    /// Why it was skipped.
    pub reason: String,
}

/// Supplies raw text for a document handle.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Extract the readable text of `handle`.
    async fn extract_text(&self, handle: &DocumentHandle) -> Result<ExtractedDocument>;
}

// ---------------------------------------------------------------------------
// Plain text files
// ---------------------------------------------------------------------------

/// Reads local text files (Markdown, plain text, ...).
#[derive(Debug, Clone, Default)]
pub struct TextFileSource;

#[async_trait]
impl DocumentSource for TextFileSource {
    async fn extract_text(&self, handle: &DocumentHandle) -> Result<ExtractedDocument> {
        let bytes = tokio::fs::read(handle.as_str())
            .await
            .map_err(|e| DocentError::source_unavailable(handle.as_str(), e.to_string()))?;

        let mut skipped = Vec::new();
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                skipped.push(SkippedSection {
                    index: 0,
                    reason: format!("invalid UTF-8 replaced: {}", e.utf8_error()),
                });
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        if text.trim().is_empty() {
            return Err(DocentError::source_unavailable(
                handle.as_str(),
                "file contains no text",
            ));
        }

        Ok(ExtractedDocument {
            text,
            title: None,
            sections_read: 1,
            skipped,
        })
    }
}

// ---------------------------------------------------------------------------
// Dispatch by handle kind
// ---------------------------------------------------------------------------

/// Routes each handle to the reader for its [`DocumentKind`].
pub struct AutoSource {
    pdf: PdfSource,
    web: WebSource,
    text: TextFileSource,
}

impl AutoSource {
    /// Build with a web client using `timeout_secs` per request.
    pub fn new(timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            pdf: PdfSource,
            web: WebSource::new(timeout_secs)?,
            text: TextFileSource,
        })
    }
}

#[async_trait]
impl DocumentSource for AutoSource {
    #[instrument(skip(self), fields(handle = %handle))]
    async fn extract_text(&self, handle: &DocumentHandle) -> Result<ExtractedDocument> {
        let kind = handle.kind();
        debug!(?kind, "dispatching document source");
        match kind {
            DocumentKind::Pdf => self.pdf.extract_text(handle).await,
            DocumentKind::Web => self.web.extract_text(handle).await,
            DocumentKind::Text => self.text.extract_text(handle).await,
        }
    }
}

#[cfg(test)]
pub(crate) fn temp_path(ext: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("docent_src_{}.{ext}", uuid::Uuid::now_v7()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_file_is_read() {
        let path = temp_path("md");
        std::fs::write(&path, "# Notes\n\nHello world.\n").unwrap();
        let handle = DocumentHandle::new(path.to_string_lossy()).unwrap();

        let doc = TextFileSource.extract_text(&handle).await.expect("extract");
        assert!(doc.text.contains("Hello world."));
        assert_eq!(doc.sections_read, 1);
        assert!(doc.skipped.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let handle = DocumentHandle::new("/nonexistent/docent/notes.txt").unwrap();
        let err = TextFileSource.extract_text(&handle).await.unwrap_err();
        assert!(matches!(err, DocentError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn invalid_utf8_degrades() {
        let path = temp_path("txt");
        std::fs::write(&path, b"caf\xe9 au lait").unwrap();
        let handle = DocumentHandle::new(path.to_string_lossy()).unwrap();

        let doc = TextFileSource.extract_text(&handle).await.expect("extract");
        assert!(doc.text.contains("au lait"));
        assert_eq!(doc.skipped.len(), 1);
    }

    #[tokio::test]
    async fn auto_source_routes_text_files() {
        let path = temp_path("txt");
        std::fs::write(&path, "plain text body").unwrap();
        let handle = DocumentHandle::new(path.to_string_lossy()).unwrap();

        let source = AutoSource::new(5).expect("build source");
        let doc = source.extract_text(&handle).await.expect("extract");
        assert_eq!(doc.text, "plain text body");
    }
}
