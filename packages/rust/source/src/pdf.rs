//! PDF text extraction via `lopdf`, page by page.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use docent_shared::{DocentError, DocumentHandle, Result};

use crate::{DocumentSource, ExtractedDocument, SkippedSection};

/// Reads the embedded text layer of local PDF files.
///
/// Pages whose text cannot be decoded, or that carry no text, are skipped.
#[derive(Debug, Clone, Default)]
pub struct PdfSource;

#[async_trait]
impl DocumentSource for PdfSource {
    #[instrument(skip(self), fields(handle = %handle))]
    async fn extract_text(&self, handle: &DocumentHandle) -> Result<ExtractedDocument> {
        let path = handle.as_str().to_owned();
        let extracted = tokio::task::spawn_blocking(move || extract_pdf(Path::new(&path)))
            .await
            .map_err(|e| DocentError::source_unavailable(handle.as_str(), e.to_string()))?;

        extracted.map_err(|reason| DocentError::source_unavailable(handle.as_str(), reason))
    }
}

/// Parse the file and collect text from every readable page.
fn extract_pdf(path: &Path) -> std::result::Result<ExtractedDocument, String> {
    let doc = lopdf::Document::load(path).map_err(|e| format!("cannot open PDF: {e}"))?;
    let pages = doc.get_pages();
    let total = pages.len();

    let mut extracted = ExtractedDocument::default();

    for &number in pages.keys() {
        match doc.extract_text(&[number]) {
            Ok(text) if !text.trim().is_empty() => {
                extracted.text.push_str(text.trim_end());
                extracted.text.push('\n');
                extracted.sections_read += 1;
            }
            Ok(_) => {
                debug!(page = number, "page has no text layer, skipping");
                extracted.skipped.push(SkippedSection {
                    index: number,
                    reason: "no text layer".into(),
                });
            }
            Err(e) => {
                warn!(page = number, error = %e, "page extraction failed, skipping");
                extracted.skipped.push(SkippedSection {
                    index: number,
                    reason: e.to_string(),
                });
            }
        }
    }

    if extracted.sections_read == 0 {
        return Err(format!("no readable text in {total} page(s)"));
    }

    debug!(
        pages = total,
        read = extracted.sections_read,
        skipped = extracted.skipped.len(),
        "pdf extraction complete"
    );

    Ok(extracted)
}
