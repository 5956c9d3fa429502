pub mod execute;
pub mod general_assist;
pub mod judging;
pub mod reflect;
pub mod refinement;
pub mod respond;
pub mod retry;
pub mod synthesis;

use std::sync::Arc;

use thiserror::Error;

use carseek_core::config::WorkflowConfig;
use carseek_core::{Confidence, TraceSink};
use carseek_db::QueryExecutor;

use crate::llm::LlmClient;
use crate::prompts::{PromptCatalog, PromptError};

/// Collaborators shared by every workflow step. Injected once at runtime
/// construction; steps never reach for globals.
pub struct StepContext {
    pub llm: Arc<dyn LlmClient>,
    pub executor: Arc<dyn QueryExecutor>,
    pub prompts: PromptCatalog,
    pub workflow: WorkflowConfig,
    pub trace: Arc<dyn TraceSink>,
}

/// What went wrong inside a step. None of these escape the turn: the runtime
/// records the report and keeps routing.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("missing input: {0}")]
    MissingInput(&'static str),
    #[error("generation call failed: {0}")]
    Generation(String),
    #[error("query execution failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

#[derive(Debug)]
pub enum StepStatus {
    /// The step ran and mutated the session.
    Completed,
    /// The step decided not to run; the session is unchanged.
    Skipped { reason: &'static str },
    /// The step failed and swallowed the error; the session is unchanged
    /// apart from any reply fallback the step documents.
    ContainedFailure { error: StepError },
}

/// Per-step outcome the runtime traces and tests assert on.
#[derive(Debug)]
pub struct StepReport {
    pub step: &'static str,
    pub status: StepStatus,
}

impl StepReport {
    pub fn completed(step: &'static str) -> Self {
        Self { step, status: StepStatus::Completed }
    }

    pub fn skipped(step: &'static str, reason: &'static str) -> Self {
        Self { step, status: StepStatus::Skipped { reason } }
    }

    pub fn contained(step: &'static str, error: StepError) -> Self {
        Self { step, status: StepStatus::ContainedFailure { error } }
    }

    pub fn advanced(&self) -> bool {
        matches!(self.status, StepStatus::Completed)
    }
}

/// Unrecognized confidence labels route as LOW, the conservative branch.
pub(crate) fn parse_confidence(raw: &str) -> Confidence {
    Confidence::parse(raw).unwrap_or(Confidence::Low)
}
