//! Append-only audit trail of stage results and question/answer exchanges.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docent_shared::{DocumentHandle, QaExchange, Result, StageKind};

use crate::memory::LogFile;

/// One completed stage execution.
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub handle: DocumentHandle,
    pub stage: StageKind,
    /// Role name of the agent that ran.
    pub role: String,
    /// The stage instruction without memory or document payloads.
    pub task: String,
    pub output: String,
    pub recorded_at: DateTime<Utc>,
}

/// Receives every stage result and every QnA exchange.
///
/// Failures are reported to the caller, who treats them as non-fatal.
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn record_stage(&self, entry: &StageRecord) -> Result<()>;

    async fn record_exchange(&self, exchange: &QaExchange) -> Result<()>;
}

/// Writes stage entries as Markdown to a progress log and exchanges as
/// plain text to a conversation log.
#[derive(Debug, Clone)]
pub struct FileRecorder {
    progress: Arc<LogFile>,
    conversation: Arc<LogFile>,
}

impl FileRecorder {
    pub fn new(progress: Arc<LogFile>, conversation: Arc<LogFile>) -> Self {
        Self {
            progress,
            conversation,
        }
    }
}

#[async_trait]
impl Recorder for FileRecorder {
    async fn record_stage(&self, entry: &StageRecord) -> Result<()> {
        self.progress.append(&format_stage_entry(entry)).await
    }

    async fn record_exchange(&self, exchange: &QaExchange) -> Result<()> {
        self.conversation.append(&format_exchange(exchange)).await
    }
}

fn format_stage_entry(entry: &StageRecord) -> String {
    format!(
        "## {}\n**Agent**: {}\n\n**Task**: {}\n\n**Output**:\n{}\n\n---\n",
        entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
        entry.role,
        entry.task,
        entry.output
    )
}

fn format_exchange(exchange: &QaExchange) -> String {
    format!(
        "[{}]\nQuestion: {}\nAnswer: {}\n\n",
        exchange.asked_at.format("%Y-%m-%d %H:%M:%S"),
        exchange.question,
        exchange.answer
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::temp_path;
    use chrono::TimeZone;

    fn record() -> StageRecord {
        StageRecord {
            handle: DocumentHandle::new("paper.pdf").unwrap(),
            stage: StageKind::Summarizer,
            role: "Summarization Expert".into(),
            task: "Summarize paper.pdf".into(),
            output: "It is about X.".into(),
            recorded_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn stage_entry_format() {
        assert_eq!(
            format_stage_entry(&record()),
            "## 2026-03-01 09:30:00\n**Agent**: Summarization Expert\n\n\
             **Task**: Summarize paper.pdf\n\n**Output**:\nIt is about X.\n\n---\n"
        );
    }

    #[test]
    fn exchange_format() {
        let mut exchange = QaExchange::new(
            DocumentHandle::new("paper.pdf").unwrap(),
            "What is it?",
            "A paper.",
        );
        exchange.asked_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 31, 5).unwrap();
        assert_eq!(
            format_exchange(&exchange),
            "[2026-03-01 09:31:05]\nQuestion: What is it?\nAnswer: A paper.\n\n"
        );
    }

    #[tokio::test]
    async fn file_recorder_appends_to_both_logs() {
        let progress = Arc::new(LogFile::new(temp_path("progress.md")));
        let conversation = Arc::new(LogFile::new(temp_path("conversation_log.txt")));
        let recorder = FileRecorder::new(Arc::clone(&progress), Arc::clone(&conversation));

        recorder.record_stage(&record()).await.unwrap();
        recorder.record_stage(&record()).await.unwrap();
        let exchange = QaExchange::new(DocumentHandle::new("paper.pdf").unwrap(), "Q", "A");
        recorder.record_exchange(&exchange).await.unwrap();

        let progress_text = progress.read().await.unwrap();
        assert_eq!(progress_text.matches("**Agent**").count(), 2);
        let conversation_text = conversation.read().await.unwrap();
        assert!(conversation_text.contains("Question: Q\nAnswer: A"));
    }
}
