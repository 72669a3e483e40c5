//! Machine placement decisions for the flowmesh subsystem.
//!
//! The decider answers, for one token at one flow node, which machine should
//! execute next. It combines the pure constraint evaluators from
//! `flowmesh-constraints` with the peer pool from `flowmesh-registry`: abort
//! pre-checks against the execution state, a local-eligibility check against
//! machine introspection, and a policy-governed bounded fan-out that asks
//! peers to self-evaluate.

pub mod decider;
pub mod error;
pub mod facts;
pub mod helper;
pub mod manager;

pub use decider::Decider;
pub use error::{DeciderError, DeciderResult};
pub use manager::ConstraintManager;
