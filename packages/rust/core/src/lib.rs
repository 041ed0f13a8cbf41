//! Core pipeline orchestration for Docent.
//!
//! This crate ties a document source, five stage agents, a memory store and a
//! recorder into the [`Orchestrator`]: preprocess a document once, cache the
//! analysis, then answer questions against it.

pub mod cache;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod prompt;
pub mod recorder;
pub mod stage;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::AnalysisCache;
pub use llm::{ChatClient, LlmAgent, llm_stages};
pub use memory::{FileMemoryStore, InMemoryStore, LogFile, MemoryStore};
pub use orchestrator::{DocumentState, Orchestrator, ProgressReporter, SilentProgress};
pub use recorder::{FileRecorder, Recorder, StageRecord};
pub use stage::{Stage, StageAgent, StageDescriptor, StageSet};
