use std::sync::Arc;

use carseek_core::config::WorkflowConfig;
use carseek_core::flows::engine::{FlowEngine, VehicleSearchFlow};
use carseek_core::flows::states::RoutingSnapshot;
use carseek_core::{
    SessionRecord, TraceCategory, TraceEvent, TraceOutcome, TraceSink, Turn, WorkflowStage,
};
use carseek_db::QueryExecutor;

use crate::llm::LlmClient;
use crate::prompts::{PromptCatalog, PromptError};
use crate::steps::{
    self, respond::RESPONSE_FAILURE_REPLY, StepContext, StepReport, StepStatus,
};

/// Drives one conversation turn through the workflow graph: runs the step
/// for the current stage, snapshots the session, asks the edge table where
/// to go next, and stops at the terminal stage.
pub struct WorkflowRuntime {
    ctx: StepContext,
    engine: FlowEngine<VehicleSearchFlow>,
}

impl WorkflowRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<dyn QueryExecutor>,
        trace: Arc<dyn TraceSink>,
        workflow: WorkflowConfig,
    ) -> Result<Self, PromptError> {
        let engine = FlowEngine::new(VehicleSearchFlow {
            rejudge_interval: workflow.rejudge_interval,
            max_query_attempts: workflow.max_query_attempts,
            max_refine_attempts: workflow.max_refine_attempts,
        });
        let ctx = StepContext {
            llm,
            executor,
            prompts: PromptCatalog::new()?,
            workflow,
            trace,
        };
        Ok(Self { ctx, engine })
    }

    /// Runs one superstep and returns the assistant reply. The session record
    /// is mutated in place; the assistant turn is appended to its history so
    /// the next call sees the full transcript.
    ///
    /// Step failures never escape: a failed step is recorded and routing
    /// continues, so every turn produces some reply.
    pub async fn run_turn(&self, session: &mut SessionRecord, user_message: &str) -> String {
        let history = std::mem::take(&mut session.turn_history);
        session.begin_turn(user_message, &history, self.ctx.workflow.history_window);

        tracing::info!(
            event_name = "turn.started",
            session_id = %session.id.0,
            interaction_count = session.interaction_count,
            "turn started"
        );

        let mut stage = self.engine.initial_stage();
        let budget = stage_budget(&self.ctx.workflow);
        let mut stages_run: u32 = 0;

        while !stage.is_terminal() {
            if stages_run >= budget {
                // The edge table cannot loop unboundedly, but a budget keeps
                // a routing bug from wedging the process.
                tracing::error!(
                    event_name = "turn.stage_budget_exhausted",
                    session_id = %session.id.0,
                    stage = stage.as_str(),
                    budget,
                    "stage budget exhausted; ending turn"
                );
                break;
            }
            stages_run += 1;

            let report = self.run_stage(stage, session).await;
            self.trace_step(session, &report);

            let snapshot = RoutingSnapshot::from_session(session);
            match self.engine.apply_with_trace(
                &stage,
                &snapshot,
                self.ctx.trace.as_ref(),
                &session.id,
            ) {
                Ok(outcome) => stage = outcome.to,
                Err(error) => {
                    tracing::error!(
                        event_name = "turn.routing_rejected",
                        session_id = %session.id.0,
                        error = %error,
                        "routing rejected; ending turn"
                    );
                    break;
                }
            }
        }

        session.finish_turn(self.ctx.workflow.rejudge_interval);

        let reply =
            session.reply.clone().unwrap_or_else(|| RESPONSE_FAILURE_REPLY.to_string());
        session.turn_history.push(Turn::assistant(reply.clone()));

        tracing::info!(
            event_name = "turn.finished",
            session_id = %session.id.0,
            stages_run,
            "turn finished"
        );
        reply
    }

    async fn run_stage(&self, stage: WorkflowStage, session: &mut SessionRecord) -> StepReport {
        match stage {
            WorkflowStage::GeneralAssist => steps::general_assist::run(&self.ctx, session).await,
            WorkflowStage::JudgingAssist => steps::judging::run(&self.ctx, session).await,
            WorkflowStage::SqlGenerate => steps::synthesis::run(&self.ctx, session).await,
            WorkflowStage::Reflect => steps::reflect::run(session),
            WorkflowStage::SqlRefine => steps::refinement::run(&self.ctx, session).await,
            WorkflowStage::SqlExecute => steps::execute::run(&self.ctx, session).await,
            WorkflowStage::Synthesize => steps::respond::run(&self.ctx, session).await,
            // The loop never dispatches the terminal stage.
            WorkflowStage::End => StepReport::skipped("end", "terminal_stage"),
        }
    }

    fn trace_step(&self, session: &SessionRecord, report: &StepReport) {
        let (outcome, detail) = match &report.status {
            StepStatus::Completed => (TraceOutcome::Success, None),
            StepStatus::Skipped { reason } => (TraceOutcome::Skipped, Some((*reason).to_string())),
            StepStatus::ContainedFailure { error } => {
                (TraceOutcome::ContainedFailure, Some(error.to_string()))
            }
        };

        let mut event = TraceEvent::new(
            session.id.clone(),
            format!("step.{}", report.step),
            TraceCategory::Step,
            outcome,
        );
        if let Some(detail) = detail {
            event = event.with_metadata("detail", detail);
        }
        self.ctx.trace.emit(event);
    }
}

/// Upper bound on stages per turn. Each retry loop can contribute two stages
/// per attempt (the retried step plus reflect), and the remaining stages are
/// a short fixed chain.
fn stage_budget(workflow: &WorkflowConfig) -> u32 {
    2 * (workflow.max_query_attempts + workflow.max_refine_attempts) + 8
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use carseek_core::config::WorkflowConfig;
    use carseek_core::{Decision, InMemoryTraceSink, OriginTag, TraceOutcome, TurnRole};
    use carseek_db::{connect_with_settings, migrations, SqliteQueryExecutor};

    use super::{stage_budget, WorkflowRuntime};
    use crate::llm::ScriptedLlmClient;

    async fn runtime_with(
        llm: Arc<ScriptedLlmClient>,
    ) -> (WorkflowRuntime, Arc<InMemoryTraceSink>) {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        let trace = Arc::new(InMemoryTraceSink::default());

        let runtime = WorkflowRuntime::new(
            llm,
            Arc::new(SqliteQueryExecutor::new(pool)),
            trace.clone(),
            WorkflowConfig {
                max_query_attempts: 5,
                max_refine_attempts: 5,
                rejudge_interval: 2,
                history_window: 10,
            },
        )
        .expect("build runtime");
        (runtime, trace)
    }

    #[test]
    fn stage_budget_covers_both_retry_loops() {
        let workflow = WorkflowConfig {
            max_query_attempts: 5,
            max_refine_attempts: 5,
            rejudge_interval: 2,
            history_window: 10,
        };
        assert_eq!(stage_budget(&workflow), 28);
    }

    #[tokio::test]
    async fn first_turn_runs_classification_only_and_ends() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_reply(
            r#"{"extracted_info": "Looking for a Toyota sedan.", "confidence": "medium"}"#,
        );
        let (runtime, trace) = runtime_with(llm).await;

        let mut session = carseek_core::SessionRecord::new();
        let reply = runtime.run_turn(&mut session, "I want a Toyota sedan").await;

        assert_eq!(reply, "Looking for a Toyota sedan.");
        assert_eq!(session.interaction_count, 1);
        assert_eq!(session.origin_tag, OriginTag::Fresh);
        assert_eq!(session.decision, Decision::Unknown);

        let last = session.turn_history.last().expect("assistant turn appended");
        assert_eq!(last.role, TurnRole::Assistant);
        assert_eq!(last.content, reply);

        let transitions: Vec<_> = trace
            .events()
            .into_iter()
            .filter(|event| event.event_type == "workflow.stage_transition")
            .collect();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].metadata.get("to").map(String::as_str), Some("end"));
    }

    #[tokio::test]
    async fn generation_failure_still_yields_a_reply() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_failure("model endpoint down");
        let (runtime, trace) = runtime_with(llm).await;

        let mut session = carseek_core::SessionRecord::new();
        let reply = runtime.run_turn(&mut session, "hello").await;

        assert!(!reply.is_empty());
        assert!(trace
            .events()
            .iter()
            .any(|event| event.event_type == "step.general_assist"
                && event.outcome == TraceOutcome::ContainedFailure));
    }
}
