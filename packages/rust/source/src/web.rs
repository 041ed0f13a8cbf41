//! Web page fetching.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, instrument, warn};

use docent_shared::{DocentError, DocumentHandle, Result};

use crate::html;
use crate::{DocumentSource, ExtractedDocument, SkippedSection};

/// User-Agent string for page requests.
const USER_AGENT: &str = concat!("Docent/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Fetches a URL and extracts the readable text of the page.
pub struct WebSource {
    client: Client,
}

impl WebSource {
    /// Create a source whose requests time out after `timeout_secs`.
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DocentError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentSource for WebSource {
    #[instrument(skip(self), fields(url = %handle))]
    async fn extract_text(&self, handle: &DocumentHandle) -> Result<ExtractedDocument> {
        let url = handle.as_str();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DocentError::source_unavailable(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocentError::source_unavailable(url, format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DocentError::source_unavailable(url, e.to_string()))?;

        let mut skipped = Vec::new();
        let (text, title) = match html::to_text(&body) {
            Ok(page) => (page.text, page.title),
            Err(reason) => {
                warn!(%reason, "markdown conversion failed, using plain text");
                skipped.push(SkippedSection { index: 0, reason });
                (html::plain_text(&body), None)
            }
        };

        if text.is_empty() {
            return Err(DocentError::source_unavailable(url, "page has no readable text"));
        }

        info!(status = status.as_u16(), chars = text.len(), "page fetched");

        Ok(ExtractedDocument {
            text,
            title,
            sections_read: 1,
            skipped,
        })
    }
}
