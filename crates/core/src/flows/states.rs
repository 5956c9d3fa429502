use serde::{Deserialize, Serialize};

use crate::domain::session::{Confidence, Decision, OriginTag, SessionRecord};

/// Stages of the vehicle-search workflow graph. `End` is terminal: the
/// superstep stops there and waits for the next user message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    GeneralAssist,
    JudgingAssist,
    SqlGenerate,
    Reflect,
    SqlRefine,
    SqlExecute,
    Synthesize,
    End,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeneralAssist => "general_assist",
            Self::JudgingAssist => "judging_assist",
            Self::SqlGenerate => "sql_generate",
            Self::Reflect => "reflect",
            Self::SqlRefine => "sql_refine",
            Self::SqlExecute => "sql_execute",
            Self::Synthesize => "synthesize",
            Self::End => "end",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "general_assist" => Some(Self::GeneralAssist),
            "judging_assist" => Some(Self::JudgingAssist),
            "sql_generate" => Some(Self::SqlGenerate),
            "reflect" => Some(Self::Reflect),
            "sql_refine" => Some(Self::SqlRefine),
            "sql_execute" => Some(Self::SqlExecute),
            "synthesize" => Some(Self::Synthesize),
            "end" => Some(Self::End),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }
}

/// The session fields routing reads after a stage's step completes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RoutingSnapshot {
    pub origin_tag: Option<OriginTag>,
    pub decision: Option<Decision>,
    pub confidence: Option<Confidence>,
    pub query_attempt_count: u32,
    pub refine_attempt_count: u32,
    pub interaction_count: u32,
}

impl RoutingSnapshot {
    pub fn from_session(session: &SessionRecord) -> Self {
        Self {
            origin_tag: Some(session.origin_tag),
            decision: Some(session.decision),
            confidence: session.confidence,
            query_attempt_count: session.query_attempt_count,
            refine_attempt_count: session.refine_attempt_count,
            interaction_count: session.interaction_count,
        }
    }

    pub fn confidence_needs_review(&self) -> bool {
        self.confidence.is_some_and(|confidence| confidence.needs_review())
    }
}

/// The routing verdict for one edge evaluation; `rule` names the condition
/// that fired so traces and tests can tell branches apart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub from: WorkflowStage,
    pub to: WorkflowStage,
    pub rule: &'static str,
}
