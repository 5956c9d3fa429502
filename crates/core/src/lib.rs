pub mod config;
pub mod domain;
pub mod flows;
pub mod trace;

pub use domain::session::{CycleMarker, ResultRow, SessionRecord, Turn, TurnRole};
pub use domain::vehicle::Vehicle;
pub use domain::{Confidence, Decision, OriginTag};
pub use flows::states::{StageOutcome, WorkflowStage};
pub use flows::FlowRoutingError;
pub use trace::{InMemoryTraceSink, TraceCategory, TraceEvent, TraceOutcome, TraceSink};
