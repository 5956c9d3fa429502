use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of a query result, keyed by column name.
pub type ResultRow = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: TurnRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, content: content.into() }
    }
}

/// Classification outcome shared by the judging step's extraction and
/// validation variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Proceed,
    RequestMoreInfo,
    Positive,
    Negative,
    Unknown,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::RequestMoreInfo => "request_more_info",
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "proceed" => Some(Self::Proceed),
            "request_more_info" => Some(Self::RequestMoreInfo),
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// True when routing should send the query back through the retry loop.
    pub fn needs_review(&self) -> bool {
        matches!(self, Self::Low | Self::Medium)
    }
}

/// Marker for which step last produced the pending session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginTag {
    Fresh,
    AwaitingConfirmation,
    FromSynthesis,
    FromRefinement,
    FromExecution,
}

impl OriginTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::FromSynthesis => "from_synthesis",
            Self::FromRefinement => "from_refinement",
            Self::FromExecution => "from_execution",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fresh" => Some(Self::Fresh),
            "awaiting_confirmation" => Some(Self::AwaitingConfirmation),
            "from_synthesis" => Some(Self::FromSynthesis),
            "from_refinement" => Some(Self::FromRefinement),
            "from_execution" => Some(Self::FromExecution),
            _ => None,
        }
    }

    /// Unknown serialized values route as a fresh conversation, never an error.
    pub fn parse_lenient(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::Fresh)
    }
}

/// Completed-cycle bookkeeping: `count` full search cycles so far, `offset`
/// marks where in the turn history the next judging transcript starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleMarker {
    pub count: u32,
    pub offset: usize,
}

impl CycleMarker {
    pub fn advance(&self, history_len: usize) -> Self {
        Self { count: self.count + 1, offset: history_len + 1 }
    }
}

/// The mutable per-conversation state threaded through every workflow step.
///
/// Turn-scoped fields (attempt counters, confidence, query texts, result
/// rows, reply) are zeroed by [`SessionRecord::begin_turn`]; the pending
/// confirmation fields survive exactly one turn boundary while
/// `origin_tag == AwaitingConfirmation`; `cycle_marker` and
/// `interaction_count` persist for the life of the conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub turn_history: Vec<Turn>,
    pub user_message: Option<String>,
    pub origin_tag: OriginTag,
    pub pending_summary: Option<String>,
    pub pending_validation_question: Option<String>,
    pub decision: Decision,
    pub confidence: Option<Confidence>,
    pub candidate_query: Option<String>,
    pub refined_query: Option<String>,
    pub query_attempt_count: u32,
    pub refine_attempt_count: u32,
    pub interaction_count: u32,
    pub result_rows: Option<Vec<ResultRow>>,
    pub cycle_marker: CycleMarker,
    pub reply: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self {
            id: SessionId::generate(),
            turn_history: Vec::new(),
            user_message: None,
            origin_tag: OriginTag::Fresh,
            pending_summary: None,
            pending_validation_question: None,
            decision: Decision::Unknown,
            confidence: None,
            candidate_query: None,
            refined_query: None,
            query_attempt_count: 0,
            refine_attempt_count: 0,
            interaction_count: 0,
            result_rows: None,
            cycle_marker: CycleMarker::default(),
            reply: None,
            created_at: Utc::now(),
        }
    }

    /// Rebuilds the zero state in place, keeping the session identity.
    pub fn reset(&mut self) {
        let id = self.id.clone();
        *self = Self::new();
        self.id = id;
    }

    /// Prepares the record for one superstep: trims the incoming history to
    /// the sliding window, appends the user turn, zeroes turn-scoped fields,
    /// and carries the pending confirmation forward only while one is
    /// outstanding.
    pub fn begin_turn(&mut self, user_message: &str, history: &[Turn], window: usize) {
        let start = history.len().saturating_sub(window);
        self.turn_history = history[start..].to_vec();
        self.turn_history.push(Turn::user(user_message));
        self.user_message = Some(user_message.to_string());

        self.confidence = None;
        self.candidate_query = None;
        self.refined_query = None;
        self.query_attempt_count = 0;
        self.refine_attempt_count = 0;
        self.result_rows = None;
        self.reply = None;

        let confirmation_outstanding =
            self.origin_tag == OriginTag::AwaitingConfirmation && self.pending_summary.is_some();
        if !confirmation_outstanding {
            self.origin_tag = OriginTag::Fresh;
            self.decision = Decision::Unknown;
            self.pending_summary = None;
            self.pending_validation_question = None;
        }
    }

    /// Post-superstep bookkeeping: the rolling interaction counter wraps at
    /// the re-judge interval, then counts the turn that just finished.
    pub fn finish_turn(&mut self, rejudge_interval: u32) {
        if self.interaction_count == rejudge_interval {
            self.interaction_count = 0;
        }
        self.interaction_count += 1;
    }
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::new()
    }
}
