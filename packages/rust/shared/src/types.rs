//! Core domain types for Docent document analysis.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{DocentError, Result};

// ---------------------------------------------------------------------------
// DocumentHandle
// ---------------------------------------------------------------------------

/// Opaque reference to the document being analyzed (file path or URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentHandle(String);

/// How a [`DocumentHandle`] should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// An `http`/`https` URL.
    Web,
    /// A local file with a `.pdf` extension.
    Pdf,
    /// Any other local file, read as UTF-8 text.
    Text,
}

impl DocumentHandle {
    /// Bind a handle. Blank handles are rejected.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(DocentError::validation("document handle must not be empty"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classify the handle by scheme or file extension.
    pub fn kind(&self) -> DocumentKind {
        if let Ok(url) = Url::parse(&self.0) {
            if matches!(url.scheme(), "http" | "https") {
                return DocumentKind::Web;
            }
        }

        let is_pdf = Path::new(&self.0)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            DocumentKind::Pdf
        } else {
            DocumentKind::Text
        }
    }
}

impl fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DocumentHandle {
    type Err = DocentError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// StageKind
// ---------------------------------------------------------------------------

/// One discrete analysis step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Reader,
    Summarizer,
    Critic,
    Innovator,
    Qna,
}

impl StageKind {
    /// The preprocessing stages, in execution order.
    pub const PREPROCESSING: [StageKind; 4] = [
        StageKind::Reader,
        StageKind::Summarizer,
        StageKind::Critic,
        StageKind::Innovator,
    ];

    /// Stable key used in config files and cache fingerprints.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Summarizer => "summarizer",
            Self::Critic => "critic",
            Self::Innovator => "innovator",
            Self::Qna => "qna",
        }
    }

    /// Human-readable role name.
    pub fn role_name(&self) -> &'static str {
        match self {
            Self::Reader => "Reader",
            Self::Summarizer => "Summarizer",
            Self::Critic => "Critic",
            Self::Innovator => "Innovator",
            Self::Qna => "QnA",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.role_name())
    }
}

// ---------------------------------------------------------------------------
// AnalysisRecord
// ---------------------------------------------------------------------------

/// The cached preprocessing outputs for one document handle.
///
/// A record only ever exists fully populated; "not yet processed" is the
/// absence of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Reader output.
    pub raw_text: String,
    /// Summarizer output.
    pub summary: String,
    /// Critic output.
    pub critique: String,
    /// Innovator output.
    pub innovation: String,
}

// ---------------------------------------------------------------------------
// QaExchange
// ---------------------------------------------------------------------------

/// One answered question. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaExchange {
    /// Time-sortable exchange identifier.
    pub id: Uuid,
    /// Document the question was asked about.
    pub handle: DocumentHandle,
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

impl QaExchange {
    pub fn new(handle: DocumentHandle, question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            handle,
            question: question.into(),
            answer: answer.into(),
            asked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_handle_rejected() {
        assert!(DocumentHandle::new("").is_err());
        assert!(DocumentHandle::new("   ").is_err());
        assert!("paper.pdf".parse::<DocumentHandle>().is_ok());
    }

    #[test]
    fn handle_kind_detection() {
        let web = DocumentHandle::new("https://example.com/post").unwrap();
        assert_eq!(web.kind(), DocumentKind::Web);

        let pdf = DocumentHandle::new("./papers/Attention.PDF").unwrap();
        assert_eq!(pdf.kind(), DocumentKind::Pdf);

        let text = DocumentHandle::new("notes/readme.md").unwrap();
        assert_eq!(text.kind(), DocumentKind::Text);

        // Non-http schemes are treated as local paths
        let other = DocumentHandle::new("ftp://example.com/file.pdf").unwrap();
        assert_eq!(other.kind(), DocumentKind::Pdf);
    }

    #[test]
    fn stage_kind_names() {
        assert_eq!(StageKind::Qna.as_str(), "qna");
        assert_eq!(StageKind::Qna.to_string(), "QnA");
        assert_eq!(StageKind::PREPROCESSING.len(), 4);
        assert_eq!(StageKind::PREPROCESSING[0], StageKind::Reader);
        assert_eq!(StageKind::PREPROCESSING[3], StageKind::Innovator);
    }

    #[test]
    fn exchange_serialization() {
        let handle = DocumentHandle::new("doc1").unwrap();
        let exchange = QaExchange::new(handle, "What is this about?", "Greetings.");
        let json = serde_json::to_string(&exchange).expect("serialize");
        let parsed: QaExchange = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.handle.as_str(), "doc1");
        assert_eq!(parsed.answer, "Greetings.");
        assert_eq!(parsed.id, exchange.id);
    }
}
