//! Shared types for the flowmesh placement subsystem.
//!
//! The constraint model mirrors the tree produced by the external constraint
//! parser; peer descriptors and the decision token are the read-only context
//! handed in by the discovery layer and the workflow engine.

pub mod config;
pub mod constraint;
pub mod decision;
pub mod ids;
pub mod introspection;
pub mod machine;
pub mod token;
pub mod wire;

pub use config::{
    DeciderConfig, EngineConfig, ProcessTimeLimits, ProcessesConfig, RouterConfig,
    SoftConstraintPolicy, DEFAULT_PEER_PORT,
};
pub use constraint::{
    AttributeMap, Condition, Conjunction, Constraint, ConstraintGroup, ConstraintGroupRef,
    ConstraintSet, Goal, HardConstraint, SoftConstraint,
};
pub use decision::{AbortCheck, MachineRecommendation, StopProcess};
pub use ids::MachineId;
pub use introspection::MachineInformation;
pub use machine::{Machine, ScoredMachine};
pub use token::{DecisionToken, ExecutionFacts, FlowNodeInfo, ProcessInfo};
pub use wire::{EvaluationRequest, PeerIdentity};
