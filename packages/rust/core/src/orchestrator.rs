//! The orchestrator: preprocess once, answer many times.
//!
//! `preprocess` runs Reader → Summarizer → Critic → Innovator for a document
//! and commits the four outputs to the [`AnalysisCache`] as one record, only
//! after every stage succeeded. `answer` ensures preprocessing, then asks the
//! QnA stage against the cached summary and a bounded excerpt of the raw
//! text. Every stage instruction carries the current memory.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use docent_shared::{
    AnalysisRecord, DocentError, DocumentHandle, PipelineOptions, QaExchange, Result, StageKind,
};
use docent_source::DocumentSource;
use docent_storage::Storage;

use crate::cache::AnalysisCache;
use crate::memory::MemoryStore;
use crate::prompt;
use crate::recorder::{Recorder, StageRecord};
use crate::stage::StageSet;

/// Progress callback for stage execution.
pub trait ProgressReporter: Send + Sync {
    /// Called before a stage agent is invoked.
    fn stage_started(&self, stage: StageKind, handle: &DocumentHandle);
    /// Called after a stage agent returned successfully.
    fn stage_finished(&self, stage: StageKind, elapsed: Duration);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _stage: StageKind, _handle: &DocumentHandle) {}
    fn stage_finished(&self, _stage: StageKind, _elapsed: Duration) {}
}

/// Whether a document has a cached analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Empty,
    Ready,
}

/// Output of one stage run, kept until it is recorded.
struct StageRun {
    kind: StageKind,
    role: String,
    /// The instruction with memory and payloads left out.
    task: String,
    output: String,
}

pub struct Orchestrator {
    stages: StageSet,
    source: Arc<dyn DocumentSource>,
    memory: Arc<dyn MemoryStore>,
    recorder: Arc<dyn Recorder>,
    cache: AnalysisCache,
    options: PipelineOptions,
    progress: Arc<dyn ProgressReporter>,
}

impl Orchestrator {
    pub fn new(
        stages: StageSet,
        source: Arc<dyn DocumentSource>,
        memory: Arc<dyn MemoryStore>,
        recorder: Arc<dyn Recorder>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            cache: AnalysisCache::new(options.cache_capacity),
            stages,
            source,
            memory,
            recorder,
            options,
            progress: Arc::new(SilentProgress),
        }
    }

    /// Persist analyses to `storage`, keyed by the current stage fingerprint.
    pub fn with_storage(mut self, storage: Arc<Storage>) -> Self {
        let fingerprint = self.stages.fingerprint();
        self.cache = AnalysisCache::new(self.options.cache_capacity).persist_to(storage, fingerprint);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// `Ready` once a record for `handle` is held in memory.
    ///
    /// A record that only exists in storage reports `Empty` until the next
    /// `preprocess` restores it.
    pub fn state(&self, handle: &DocumentHandle) -> DocumentState {
        if self.cache.contains(handle) {
            DocumentState::Ready
        } else {
            DocumentState::Empty
        }
    }

    pub fn analysis(&self, handle: &DocumentHandle) -> Option<&AnalysisRecord> {
        self.cache.get(handle)
    }

    /// Ensure an analysis exists for `handle`.
    ///
    /// Returns immediately when one is cached or restorable from storage.
    /// Otherwise runs all four preprocessing stages; on failure nothing is
    /// cached and the next call starts over from the Reader.
    #[instrument(skip_all, fields(handle = %handle))]
    pub async fn preprocess(&mut self, handle: &DocumentHandle) -> Result<()> {
        if self.cache.lookup(handle).await {
            debug!("analysis cache hit, skipping preprocessing");
            return Ok(());
        }

        let start = Instant::now();
        info!("starting preprocessing");

        let (record, runs) = self.run_preprocessing(handle).await?;
        self.cache.commit(handle, record).await;

        for run in &runs {
            self.record_stage(handle, run).await;
        }

        info!(elapsed_ms = start.elapsed().as_millis() as u64, "preprocessing complete");
        Ok(())
    }

    /// Answer `question` about `handle`, preprocessing it first if needed.
    #[instrument(skip_all, fields(handle = %handle))]
    pub async fn answer(&mut self, handle: &DocumentHandle, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DocentError::validation("question must not be empty"));
        }

        self.preprocess(handle).await?;

        let record = self.cache.get(handle).ok_or_else(|| {
            DocentError::answer(DocentError::Storage(format!(
                "analysis for {handle} missing after preprocessing"
            )))
        })?;

        let excerpt = prompt::excerpt(&record.raw_text, self.options.excerpt_chars);
        let run = self
            .run_stage(
                StageKind::Qna,
                handle,
                &[
                    ("question", question),
                    ("summary", record.summary.as_str()),
                    ("excerpt", excerpt.as_ref()),
                ],
            )
            .await
            .map_err(DocentError::answer)?;

        let exchange = QaExchange::new(handle.clone(), question, run.output);
        if let Err(e) = self.recorder.record_exchange(&exchange).await {
            warn!(error = %e, "failed to record exchange");
        }

        Ok(exchange.answer)
    }

    /// Drop the analysis for `handle` so the next `preprocess` recomputes it.
    #[instrument(skip_all, fields(handle = %handle))]
    pub async fn reset(&mut self, handle: &DocumentHandle) -> Result<()> {
        let removed = self.cache.invalidate(handle).await?;
        info!(removed, "analysis reset");
        Ok(())
    }

    /// Clear the conversation memory.
    pub async fn clear_memory(&self) -> Result<()> {
        self.memory.clear().await
    }

    async fn run_preprocessing(
        &self,
        handle: &DocumentHandle,
    ) -> Result<(AnalysisRecord, Vec<StageRun>)> {
        let document = self
            .source
            .extract_text(handle)
            .await
            .map_err(|e| DocentError::preprocessing(StageKind::Reader, e))?;

        for skipped in &document.skipped {
            warn!(section = skipped.index, reason = %skipped.reason, "section skipped during extraction");
        }
        info!(
            title = document.title.as_deref().unwrap_or("-"),
            sections = document.sections_read,
            skipped = document.skipped.len(),
            chars = document.text.len(),
            "document extracted"
        );

        let document_text = prompt::excerpt(&document.text, self.options.document_chars);
        let reader = self
            .preprocessing_stage(StageKind::Reader, handle, &[("document", document_text.as_ref())])
            .await?;
        let summarizer = self
            .preprocessing_stage(StageKind::Summarizer, handle, &[("input", reader.output.as_str())])
            .await?;

        let review_input = [("input", summarizer.output.as_str())];
        let (critic, innovator) = if self.options.parallel_review {
            futures::future::try_join(
                self.preprocessing_stage(StageKind::Critic, handle, &review_input),
                self.preprocessing_stage(StageKind::Innovator, handle, &review_input),
            )
            .await?
        } else {
            let critic = self
                .preprocessing_stage(StageKind::Critic, handle, &review_input)
                .await?;
            let innovator = self
                .preprocessing_stage(StageKind::Innovator, handle, &review_input)
                .await?;
            (critic, innovator)
        };

        let record = AnalysisRecord {
            raw_text: reader.output.clone(),
            summary: summarizer.output.clone(),
            critique: critic.output.clone(),
            innovation: innovator.output.clone(),
        };

        Ok((record, vec![reader, summarizer, critic, innovator]))
    }

    async fn preprocessing_stage(
        &self,
        kind: StageKind,
        handle: &DocumentHandle,
        vars: &[(&str, &str)],
    ) -> Result<StageRun> {
        self.run_stage(kind, handle, vars)
            .await
            .map_err(|e| DocentError::preprocessing(kind, e))
    }

    /// Render the stage instruction with fresh memory and invoke the agent.
    ///
    /// The recorded task is rendered with the handle only. Stage entries land
    /// in the memory file, so keeping memory and document text out of them
    /// stops memory from compounding across runs.
    async fn run_stage(
        &self,
        kind: StageKind,
        handle: &DocumentHandle,
        vars: &[(&str, &str)],
    ) -> Result<StageRun> {
        let stage = self.stages.get(kind);
        let memory = self.memory.load().await?;

        let mut all_vars = Vec::with_capacity(vars.len() + 2);
        all_vars.push(("handle", handle.as_str()));
        all_vars.push(("memory", memory.as_str()));
        all_vars.extend_from_slice(vars);
        let instruction = stage.descriptor.render(&all_vars);

        let blanks: Vec<(&str, &str)> = all_vars
            .iter()
            .map(|&(name, value)| (name, if name == "handle" { value } else { "" }))
            .collect();
        let task = stage.descriptor.render(&blanks);

        self.progress.stage_started(kind, handle);
        let start = Instant::now();
        let output = stage.agent().invoke(&instruction).await?;

        if output.trim().is_empty() {
            return Err(DocentError::MalformedOutput(format!(
                "{kind} stage returned empty output"
            )));
        }

        let elapsed = start.elapsed();
        self.progress.stage_finished(kind, elapsed);
        info!(
            stage = kind.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            chars = output.len(),
            "stage complete"
        );

        Ok(StageRun {
            kind,
            role: stage.descriptor.role.clone(),
            task,
            output,
        })
    }

    async fn record_stage(&self, handle: &DocumentHandle, run: &StageRun) {
        let entry = StageRecord {
            handle: handle.clone(),
            stage: run.kind,
            role: run.role.clone(),
            task: run.task.clone(),
            output: run.output.clone(),
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.recorder.record_stage(&entry).await {
            warn!(stage = run.kind.as_str(), error = %e, "failed to record stage");
        }
    }
}
