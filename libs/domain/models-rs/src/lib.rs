
pub mod assignment;
pub mod command;
pub mod defect;
pub mod instance;
pub mod rebalance;
pub mod wire;

pub use assignment::{AssignmentStatus, StreamAssignment};
pub use command::WorkerCommand;
pub use defect::{DefectKind, DefectRecord};
pub use instance::{Instance, InstanceStatus};
pub use rebalance::{PlanLegSummary, PlanSummary, RebalanceEvent, RebalanceOutcome, RebalanceReason};
pub use wire::{
    AssignmentRequestPayload, HeartbeatAcknowledgement, HeartbeatPayload, ProcessingMetrics,
    RegisterAcknowledgement, RegisterPayload, ReleaseOutcome, ReleasePayload, StreamProcessingStatus,
    UpdateStreamPayload,
};
