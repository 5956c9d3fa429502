use thiserror::Error;

use crate::domain::session::{Decision, OriginTag, SessionId};
use crate::flows::states::{RoutingSnapshot, StageOutcome, WorkflowStage};
use crate::trace::{TraceCategory, TraceEvent, TraceOutcome, TraceSink};

/// Conditional-edge table for one workflow graph. Implementations must be
/// total over non-terminal stages and deterministic in the snapshot.
pub trait RoutingPolicy {
    fn initial_stage(&self) -> WorkflowStage;
    fn next_stage(
        &self,
        current: &WorkflowStage,
        snapshot: &RoutingSnapshot,
    ) -> Result<StageOutcome, FlowRoutingError>;
}

/// The vehicle-search pipeline's edge table. The attempt ceilings and the
/// re-judge interval come from workflow configuration.
#[derive(Clone, Debug)]
pub struct VehicleSearchFlow {
    pub rejudge_interval: u32,
    pub max_query_attempts: u32,
    pub max_refine_attempts: u32,
}

impl Default for VehicleSearchFlow {
    fn default() -> Self {
        Self { rejudge_interval: 2, max_query_attempts: 5, max_refine_attempts: 5 }
    }
}

impl RoutingPolicy for VehicleSearchFlow {
    fn initial_stage(&self) -> WorkflowStage {
        WorkflowStage::GeneralAssist
    }

    fn next_stage(
        &self,
        current: &WorkflowStage,
        snapshot: &RoutingSnapshot,
    ) -> Result<StageOutcome, FlowRoutingError> {
        route_vehicle_search(self, current, snapshot)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: RoutingPolicy,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_stage(&self) -> WorkflowStage {
        self.flow.initial_stage()
    }

    pub fn apply(
        &self,
        current: &WorkflowStage,
        snapshot: &RoutingSnapshot,
    ) -> Result<StageOutcome, FlowRoutingError> {
        self.flow.next_stage(current, snapshot)
    }

    pub fn apply_with_trace<S>(
        &self,
        current: &WorkflowStage,
        snapshot: &RoutingSnapshot,
        sink: &S,
        session_id: &SessionId,
    ) -> Result<StageOutcome, FlowRoutingError>
    where
        S: TraceSink + ?Sized,
    {
        let result = self.apply(current, snapshot);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    TraceEvent::new(
                        session_id.clone(),
                        "workflow.stage_transition",
                        TraceCategory::Routing,
                        TraceOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("rule", outcome.rule),
                );
            }
            Err(error) => {
                sink.emit(
                    TraceEvent::new(
                        session_id.clone(),
                        "workflow.stage_transition_rejected",
                        TraceCategory::Routing,
                        TraceOutcome::ContainedFailure,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<VehicleSearchFlow> {
    fn default() -> Self {
        Self::new(VehicleSearchFlow::default())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowRoutingError {
    #[error("terminal stage {stage:?} has no outgoing edges")]
    TerminalStage { stage: WorkflowStage },
}

fn route_vehicle_search(
    flow: &VehicleSearchFlow,
    current: &WorkflowStage,
    snapshot: &RoutingSnapshot,
) -> Result<StageOutcome, FlowRoutingError> {
    use WorkflowStage::{
        End, GeneralAssist, JudgingAssist, Reflect, SqlExecute, SqlGenerate, SqlRefine, Synthesize,
    };

    let origin = snapshot.origin_tag.unwrap_or(OriginTag::Fresh);
    let decision = snapshot.decision.unwrap_or(Decision::Unknown);

    let (to, rule) = match current {
        GeneralAssist => {
            if snapshot.interaction_count == flow.rejudge_interval {
                (JudgingAssist, "interaction_interval_reached")
            } else if origin == OriginTag::AwaitingConfirmation {
                (JudgingAssist, "confirmation_outstanding")
            } else {
                (End, "await_next_turn")
            }
        }
        JudgingAssist => match decision {
            Decision::Positive => (SqlGenerate, "search_confirmed"),
            Decision::Negative => (GeneralAssist, "search_rejected"),
            _ => (End, "needs_user_input"),
        },
        SqlGenerate => {
            if snapshot.confidence_needs_review()
                && snapshot.query_attempt_count < flow.max_query_attempts
            {
                (Reflect, "confidence_under_review")
            } else {
                (SqlExecute, "confidence_settled_or_ceiling")
            }
        }
        Reflect => match origin {
            OriginTag::FromSynthesis => (SqlGenerate, "retry_synthesis"),
            OriginTag::FromRefinement => (SqlRefine, "retry_refinement"),
            _ => (GeneralAssist, "unrecognized_origin"),
        },
        SqlRefine => {
            if snapshot.confidence_needs_review()
                && snapshot.refine_attempt_count < flow.max_refine_attempts
            {
                (Reflect, "confidence_under_review")
            } else {
                (SqlExecute, "confidence_settled_or_ceiling")
            }
        }
        SqlExecute => (Synthesize, "execution_complete"),
        Synthesize => (End, "turn_complete"),
        End => return Err(FlowRoutingError::TerminalStage { stage: End }),
    };

    Ok(StageOutcome { from: *current, to, rule })
}

#[cfg(test)]
mod tests {
    use crate::domain::session::{Confidence, Decision, OriginTag, SessionId};
    use crate::flows::engine::{FlowEngine, FlowRoutingError, RoutingPolicy, VehicleSearchFlow};
    use crate::flows::states::{RoutingSnapshot, WorkflowStage};
    use crate::trace::InMemoryTraceSink;

    fn snapshot() -> RoutingSnapshot {
        RoutingSnapshot {
            origin_tag: Some(OriginTag::Fresh),
            decision: Some(Decision::Unknown),
            confidence: None,
            query_attempt_count: 0,
            refine_attempt_count: 0,
            interaction_count: 1,
        }
    }

    #[test]
    fn general_assist_ends_turn_when_nothing_is_pending() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(&WorkflowStage::GeneralAssist, &snapshot())
            .expect("general_assist routes");

        assert_eq!(outcome.to, WorkflowStage::End);
        assert_eq!(outcome.rule, "await_next_turn");
    }

    #[test]
    fn general_assist_enters_judging_when_interval_reached() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(
                &WorkflowStage::GeneralAssist,
                &RoutingSnapshot { interaction_count: 2, ..snapshot() },
            )
            .expect("general_assist routes");

        assert_eq!(outcome.to, WorkflowStage::JudgingAssist);
        assert_eq!(outcome.rule, "interaction_interval_reached");
    }

    #[test]
    fn general_assist_enters_judging_while_confirmation_outstanding() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(
                &WorkflowStage::GeneralAssist,
                &RoutingSnapshot {
                    origin_tag: Some(OriginTag::AwaitingConfirmation),
                    ..snapshot()
                },
            )
            .expect("general_assist routes");

        assert_eq!(outcome.to, WorkflowStage::JudgingAssist);
        assert_eq!(outcome.rule, "confirmation_outstanding");
    }

    #[test]
    fn judging_routes_on_decision() {
        let engine = FlowEngine::default();

        let confirmed = engine
            .apply(
                &WorkflowStage::JudgingAssist,
                &RoutingSnapshot { decision: Some(Decision::Positive), ..snapshot() },
            )
            .expect("judging routes");
        assert_eq!(confirmed.to, WorkflowStage::SqlGenerate);

        let rejected = engine
            .apply(
                &WorkflowStage::JudgingAssist,
                &RoutingSnapshot { decision: Some(Decision::Negative), ..snapshot() },
            )
            .expect("judging routes");
        assert_eq!(rejected.to, WorkflowStage::GeneralAssist);

        let pending = engine
            .apply(
                &WorkflowStage::JudgingAssist,
                &RoutingSnapshot { decision: Some(Decision::Proceed), ..snapshot() },
            )
            .expect("judging routes");
        assert_eq!(pending.to, WorkflowStage::End);
    }

    #[test]
    fn generate_reflects_while_confidence_low_and_budget_remains() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(
                &WorkflowStage::SqlGenerate,
                &RoutingSnapshot {
                    confidence: Some(Confidence::Low),
                    query_attempt_count: 1,
                    ..snapshot()
                },
            )
            .expect("generate routes");

        assert_eq!(outcome.to, WorkflowStage::Reflect);
    }

    #[test]
    fn generate_executes_once_attempt_ceiling_reached() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(
                &WorkflowStage::SqlGenerate,
                &RoutingSnapshot {
                    confidence: Some(Confidence::Low),
                    query_attempt_count: 5,
                    ..snapshot()
                },
            )
            .expect("generate routes");

        assert_eq!(outcome.to, WorkflowStage::SqlExecute);
        assert_eq!(outcome.rule, "confidence_settled_or_ceiling");
    }

    #[test]
    fn generate_executes_on_high_confidence() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(
                &WorkflowStage::SqlGenerate,
                &RoutingSnapshot { confidence: Some(Confidence::High), ..snapshot() },
            )
            .expect("generate routes");

        assert_eq!(outcome.to, WorkflowStage::SqlExecute);
    }

    #[test]
    fn reflect_routes_back_to_the_originating_step() {
        let engine = FlowEngine::default();

        let to_generate = engine
            .apply(
                &WorkflowStage::Reflect,
                &RoutingSnapshot { origin_tag: Some(OriginTag::FromSynthesis), ..snapshot() },
            )
            .expect("reflect routes");
        assert_eq!(to_generate.to, WorkflowStage::SqlGenerate);

        let to_refine = engine
            .apply(
                &WorkflowStage::Reflect,
                &RoutingSnapshot { origin_tag: Some(OriginTag::FromRefinement), ..snapshot() },
            )
            .expect("reflect routes");
        assert_eq!(to_refine.to, WorkflowStage::SqlRefine);

        let fallback = engine
            .apply(
                &WorkflowStage::Reflect,
                &RoutingSnapshot { origin_tag: Some(OriginTag::Fresh), ..snapshot() },
            )
            .expect("reflect routes");
        assert_eq!(fallback.to, WorkflowStage::GeneralAssist);
        assert_eq!(fallback.rule, "unrecognized_origin");
    }

    #[test]
    fn refine_ceiling_forces_execution() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(
                &WorkflowStage::SqlRefine,
                &RoutingSnapshot {
                    confidence: Some(Confidence::Medium),
                    refine_attempt_count: 5,
                    ..snapshot()
                },
            )
            .expect("refine routes");

        assert_eq!(outcome.to, WorkflowStage::SqlExecute);
    }

    #[test]
    fn execution_always_flows_into_synthesis_then_end() {
        let engine = FlowEngine::default();

        let to_synthesize =
            engine.apply(&WorkflowStage::SqlExecute, &snapshot()).expect("execute routes");
        assert_eq!(to_synthesize.to, WorkflowStage::Synthesize);

        let to_end =
            engine.apply(&WorkflowStage::Synthesize, &snapshot()).expect("synthesize routes");
        assert_eq!(to_end.to, WorkflowStage::End);
    }

    #[test]
    fn terminal_stage_is_rejected() {
        let engine = FlowEngine::default();
        let error =
            engine.apply(&WorkflowStage::End, &snapshot()).expect_err("end has no outgoing edges");

        assert!(matches!(error, FlowRoutingError::TerminalStage { stage: WorkflowStage::End }));
        assert_eq!(error.to_string(), "terminal stage End has no outgoing edges");
    }

    #[test]
    fn unset_snapshot_fields_route_as_fresh_session() {
        let engine = FlowEngine::default();

        let judging = engine
            .apply(
                &WorkflowStage::JudgingAssist,
                &RoutingSnapshot { decision: None, ..snapshot() },
            )
            .expect("judging routes");
        assert_eq!(judging.to, WorkflowStage::End);

        let reflect = engine
            .apply(&WorkflowStage::Reflect, &RoutingSnapshot { origin_tag: None, ..snapshot() })
            .expect("reflect routes");
        assert_eq!(reflect.to, WorkflowStage::GeneralAssist);
    }

    #[test]
    fn replay_is_deterministic_for_same_snapshot_sequence() {
        let engine = FlowEngine::default();
        let snapshots = [
            (WorkflowStage::GeneralAssist, RoutingSnapshot { interaction_count: 2, ..snapshot() }),
            (
                WorkflowStage::JudgingAssist,
                RoutingSnapshot { decision: Some(Decision::Positive), ..snapshot() },
            ),
            (
                WorkflowStage::SqlGenerate,
                RoutingSnapshot { confidence: Some(Confidence::High), ..snapshot() },
            ),
            (WorkflowStage::SqlExecute, snapshot()),
            (WorkflowStage::Synthesize, snapshot()),
        ];

        let run = |engine: &FlowEngine<VehicleSearchFlow>| {
            snapshots
                .iter()
                .map(|(stage, snapshot)| {
                    engine.apply(stage, snapshot).expect("deterministic run").to
                })
                .collect::<Vec<_>>()
        };

        let first = run(&engine);
        let second = run(&engine);

        assert_eq!(first, second);
        assert_eq!(engine.initial_stage(), WorkflowStage::GeneralAssist);
        assert_eq!(VehicleSearchFlow::default().initial_stage(), WorkflowStage::GeneralAssist);
    }

    #[test]
    fn stage_transition_emits_trace_event() {
        let engine = FlowEngine::default();
        let sink = InMemoryTraceSink::default();

        let _ = engine
            .apply_with_trace(
                &WorkflowStage::GeneralAssist,
                &RoutingSnapshot { interaction_count: 2, ..snapshot() },
                &sink,
                &SessionId("s-9".to_owned()),
            )
            .expect("transition should succeed");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "workflow.stage_transition");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("judging_assist"));
        assert_eq!(
            events[0].metadata.get("rule").map(String::as_str),
            Some("interaction_interval_reached")
        );
    }
}
