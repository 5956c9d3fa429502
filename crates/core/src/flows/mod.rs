pub mod engine;
pub mod states;

pub use engine::{FlowEngine, FlowRoutingError, RoutingPolicy, VehicleSearchFlow};
pub use states::{RoutingSnapshot, StageOutcome, WorkflowStage};
