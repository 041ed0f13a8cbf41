//! Stage agents and their descriptors.
//!
//! A [`Stage`] pairs the static description of a pipeline step (role, goal,
//! instruction template) with the [`StageAgent`] that executes it. The five
//! stages of a run are bundled in a [`StageSet`].

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use docent_shared::{Result, StageKind};

use crate::prompt;

/// Executes one rendered instruction and returns the model's text.
///
/// Implementations must be callable concurrently for different stages.
#[async_trait]
pub trait StageAgent: Send + Sync {
    /// Run `instruction` and return the produced text.
    async fn invoke(&self, instruction: &str) -> Result<String>;

    /// Identifies the backend binding (e.g. the model id) for fingerprinting.
    fn describe(&self) -> String {
        String::from("custom")
    }
}

/// Static description of a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    pub kind: StageKind,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    /// Template with `{placeholder}` variables, see [`prompt::render`].
    pub instruction_template: String,
    pub expected_output: String,
}

impl StageDescriptor {
    /// The built-in descriptor for `kind`.
    pub fn default_for(kind: StageKind) -> Self {
        let (role, goal, backstory, template, expected) = match kind {
            StageKind::Reader => (
                "Document Reader",
                "Read the document and provide the raw material for analysis",
                "You are good at quickly taking in a whole document and reproducing its text faithfully.",
                "Read the full content of the document {handle} and reproduce it as clean plain text.\n\n\
                 [Document text]\n{document}\n\n[Conversation history]\n{memory}",
                "The raw text of the document",
            ),
            StageKind::Summarizer => (
                "Summarization Expert",
                "Summarize the main content of the document",
                "You are skilled at pulling the essentials out of long technical texts.",
                "Summarize the main content of the document {handle}, including:\n\
                 1. Title\n2. Abstract\n3. Key points\n\n\
                 [Document content]\n{input}\n\n[Conversation history]\n{memory}",
                "A summary with title, abstract and key points",
            ),
            StageKind::Critic => (
                "Academic Critic",
                "Identify the weaknesses of the document",
                "You are a reviewer with a sharp eye for gaps in reasoning and evidence.",
                "Analyze the shortcomings of the document {handle}: logical gaps, missing \
                 arguments and insufficient data.\n\n\
                 [Document summary]\n{input}\n\n[Conversation history]\n{memory}",
                "Shortcomings and directions for improvement",
            ),
            StageKind::Innovator => (
                "Innovation Advisor",
                "Propose improvements and new directions",
                "You turn existing work into concrete ideas for what to try next.",
                "Propose improvements and innovations based on the document {handle}.\n\n\
                 [Document summary]\n{input}\n\n[Conversation history]\n{memory}",
                "Innovation and improvement suggestions",
            ),
            StageKind::Qna => (
                "Q&A Assistant",
                "Answer questions about the document accurately",
                "You answer strictly from the document and say so when it does not cover a question.",
                "Answer the question based on the following content: {question}\n\n\
                 [Document summary]\n{summary}\n\n[Original content] (excerpt)\n{excerpt}\n\n\
                 [Conversation history]\n{memory}",
                "An answer grounded in the document",
            ),
        };

        Self {
            kind,
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            instruction_template: template.into(),
            expected_output: expected.into(),
        }
    }

    /// Render the instruction template with `vars`.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        prompt::render(&self.instruction_template, vars)
    }
}

/// A descriptor bound to the agent that executes it.
#[derive(Clone)]
pub struct Stage {
    pub descriptor: StageDescriptor,
    agent: Arc<dyn StageAgent>,
}

impl Stage {
    pub fn new(descriptor: StageDescriptor, agent: Arc<dyn StageAgent>) -> Self {
        Self { descriptor, agent }
    }

    pub fn kind(&self) -> StageKind {
        self.descriptor.kind
    }

    pub fn agent(&self) -> &dyn StageAgent {
        self.agent.as_ref()
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("kind", &self.descriptor.kind)
            .field("agent", &self.agent.describe())
            .finish()
    }
}

/// The five stages of a run.
#[derive(Debug, Clone)]
pub struct StageSet {
    reader: Stage,
    summarizer: Stage,
    critic: Stage,
    innovator: Stage,
    qna: Stage,
}

impl StageSet {
    pub fn new(reader: Stage, summarizer: Stage, critic: Stage, innovator: Stage, qna: Stage) -> Self {
        Self {
            reader,
            summarizer,
            critic,
            innovator,
            qna,
        }
    }

    /// Default descriptors, with the agent for each stage supplied by `agent_for`.
    pub fn from_fn(agent_for: impl Fn(StageKind) -> Arc<dyn StageAgent>) -> Self {
        let stage = |kind| Stage::new(StageDescriptor::default_for(kind), agent_for(kind));
        Self::new(
            stage(StageKind::Reader),
            stage(StageKind::Summarizer),
            stage(StageKind::Critic),
            stage(StageKind::Innovator),
            stage(StageKind::Qna),
        )
    }

    pub fn get(&self, kind: StageKind) -> &Stage {
        match kind {
            StageKind::Reader => &self.reader,
            StageKind::Summarizer => &self.summarizer,
            StageKind::Critic => &self.critic,
            StageKind::Innovator => &self.innovator,
            StageKind::Qna => &self.qna,
        }
    }

    /// Hash of everything that shapes an analysis record.
    ///
    /// Covers the four preprocessing stages only; changing the QnA stage does
    /// not invalidate persisted analyses.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for kind in StageKind::PREPROCESSING {
            let stage = self.get(kind);
            let d = &stage.descriptor;
            let binding = stage.agent.describe();
            for part in [
                kind.as_str(),
                d.role.as_str(),
                d.goal.as_str(),
                d.backstory.as_str(),
                d.instruction_template.as_str(),
                d.expected_output.as_str(),
                binding.as_str(),
            ] {
                hasher.update(part.as_bytes());
                hasher.update([0u8]);
            }
        }
        format!("{:x}", hasher.finalize())
    }
}
