//! Test doubles for orchestrator tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use docent_shared::{DocentError, DocumentHandle, PipelineOptions, QaExchange, Result, StageKind};
use docent_source::{DocumentSource, ExtractedDocument};
use docent_storage::Storage;

use crate::memory::{FileMemoryStore, InMemoryStore, LogFile, temp_path};
use crate::orchestrator::{Orchestrator, ProgressReporter};
use crate::recorder::{FileRecorder, Recorder, StageRecord};
use crate::stage::{StageAgent, StageSet};

/// Every instruction received by any stub agent, in call order.
#[derive(Default)]
pub(crate) struct CallLog {
    calls: Mutex<Vec<(StageKind, String)>>,
}

impl CallLog {
    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn count_for(&self, kind: StageKind) -> usize {
        self.calls.lock().unwrap().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.calls.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }

    pub fn instructions(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, i)| i.clone()).collect()
    }

    pub fn instructions_for(&self, kind: StageKind) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, i)| i.clone())
            .collect()
    }
}

/// Shared knobs for the stub agents of one harness.
#[derive(Default)]
struct Behaviour {
    failing: Mutex<HashSet<StageKind>>,
    replies: Mutex<HashMap<StageKind, String>>,
}

/// Echoes its role name unless told to fail or reply with something else.
struct StubAgent {
    kind: StageKind,
    calls: Arc<CallLog>,
    behaviour: Arc<Behaviour>,
}

#[async_trait]
impl StageAgent for StubAgent {
    async fn invoke(&self, instruction: &str) -> Result<String> {
        self.calls
            .calls
            .lock()
            .unwrap()
            .push((self.kind, instruction.to_string()));

        if self.behaviour.failing.lock().unwrap().contains(&self.kind) {
            return Err(DocentError::Transport(format!("{} unreachable", self.kind)));
        }

        let reply = self.behaviour.replies.lock().unwrap().get(&self.kind).cloned();
        Ok(reply.unwrap_or_else(|| self.kind.role_name().to_string()))
    }

    fn describe(&self) -> String {
        "stub".into()
    }
}

/// Always returns the same document text.
pub(crate) struct StaticSource(pub &'static str);

#[async_trait]
impl DocumentSource for StaticSource {
    async fn extract_text(&self, _handle: &DocumentHandle) -> Result<ExtractedDocument> {
        Ok(ExtractedDocument {
            text: self.0.to_string(),
            title: None,
            sections_read: 1,
            skipped: Vec::new(),
        })
    }
}

pub(crate) struct FailingSource;

#[async_trait]
impl DocumentSource for FailingSource {
    async fn extract_text(&self, handle: &DocumentHandle) -> Result<ExtractedDocument> {
        Err(DocentError::source_unavailable(handle.as_str(), "no such file"))
    }
}

/// Counts recorder calls; can be switched to fail every write.
#[derive(Default)]
pub(crate) struct CountingRecorder {
    stages: AtomicUsize,
    exchanges: AtomicUsize,
    failing: AtomicBool,
}

impl CountingRecorder {
    pub fn stage_count(&self) -> usize {
        self.stages.load(Ordering::SeqCst)
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.stage_count() + self.exchange_count()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(DocentError::Storage("disk full".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Recorder for CountingRecorder {
    async fn record_stage(&self, _entry: &StageRecord) -> Result<()> {
        self.check()?;
        self.stages.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn record_exchange(&self, _exchange: &QaExchange) -> Result<()> {
        self.check()?;
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct CountingProgress {
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl CountingProgress {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl ProgressReporter for CountingProgress {
    fn stage_started(&self, _stage: StageKind, _handle: &DocumentHandle) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn stage_finished(&self, _stage: StageKind, _elapsed: Duration) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Stub stages, in-memory memory and a counting recorder wired together.
pub(crate) struct Harness {
    pub calls: Arc<CallLog>,
    pub memory: Arc<InMemoryStore>,
    pub recorder: Arc<CountingRecorder>,
    behaviour: Arc<Behaviour>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(CallLog::default()),
            memory: Arc::new(InMemoryStore::new()),
            recorder: Arc::new(CountingRecorder::default()),
            behaviour: Arc::new(Behaviour::default()),
        }
    }

    pub fn fail(&self, kind: StageKind) {
        self.behaviour.failing.lock().unwrap().insert(kind);
    }

    pub fn recover(&self, kind: StageKind) {
        self.behaviour.failing.lock().unwrap().remove(&kind);
    }

    pub fn reply(&self, kind: StageKind, text: &str) {
        self.behaviour
            .replies
            .lock()
            .unwrap()
            .insert(kind, text.to_string());
    }

    pub fn stages(&self) -> StageSet {
        StageSet::from_fn(|kind| {
            let agent: Arc<dyn StageAgent> = Arc::new(StubAgent {
                kind,
                calls: Arc::clone(&self.calls),
                behaviour: Arc::clone(&self.behaviour),
            });
            agent
        })
    }

    pub fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with_options(PipelineOptions::default())
    }

    pub fn orchestrator_with_options(&self, options: PipelineOptions) -> Orchestrator {
        self.build(Arc::new(StaticSource("Hello world.")), options)
    }

    pub fn orchestrator_with_source(&self, source: Arc<dyn DocumentSource>) -> Orchestrator {
        self.build(source, PipelineOptions::default())
    }

    /// Wired like the CLI: the recorder appends stage entries to the same
    /// file the memory store reads.
    pub fn orchestrator_with_log(&self, progress_log: Arc<LogFile>) -> Orchestrator {
        let conversation = Arc::new(LogFile::new(temp_path("conversation_log.txt")));
        Orchestrator::new(
            self.stages(),
            Arc::new(StaticSource("Hello world.")),
            Arc::new(FileMemoryStore::new(Arc::clone(&progress_log))),
            Arc::new(FileRecorder::new(progress_log, conversation)),
            PipelineOptions::default(),
        )
    }

    fn build(&self, source: Arc<dyn DocumentSource>, options: PipelineOptions) -> Orchestrator {
        Orchestrator::new(
            self.stages(),
            source,
            Arc::clone(&self.memory) as _,
            Arc::clone(&self.recorder) as _,
            options,
        )
    }
}

pub(crate) async fn temp_storage() -> Arc<Storage> {
    let tmp = std::env::temp_dir().join(format!("docent_test_{}.db", uuid::Uuid::now_v7()));
    Arc::new(Storage::open(&tmp).await.unwrap())
}
