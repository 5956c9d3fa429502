//! Agent runtime - conversational vehicle search orchestration
//!
//! This crate is the "brain" of the CarSeek system. It drives each user
//! message through a staged workflow:
//!
//! 1. **Classification** (`steps::general_assist`) - Extract search criteria
//!    from natural language
//! 2. **Judging** (`steps::judging`) - Decide whether enough criteria exist
//!    and confirm them with the user
//! 3. **Query synthesis** (`steps::synthesis` / `steps::refinement`) - Turn
//!    confirmed criteria into SQL, dry-run validated with bounded retries
//! 4. **Execution and response** (`steps::execute` / `steps::respond`) - Run
//!    the query and render the results into a reply
//!
//! # Key Types
//!
//! - `WorkflowRuntime` - Main orchestrator (see `runtime` module)
//! - `LlmClient` - Pluggable trait for OpenAI/Anthropic/Ollama
//! - `PromptCatalog` - Compiled prompt templates and reply parsing
//!
//! # Safety Principle
//!
//! The LLM is strictly a translator. Generated SQL is never executed before
//! it passes a dry run, and every step failure is contained so a turn always
//! ends with a reply.

pub mod conversation;
pub mod llm;
pub mod prompts;
pub mod runtime;
pub mod steps;

pub use llm::{HttpLlmClient, LlmClient, ScriptedLlmClient};
pub use prompts::{PromptCatalog, PromptError};
pub use runtime::WorkflowRuntime;
pub use steps::{StepContext, StepError, StepReport, StepStatus};
