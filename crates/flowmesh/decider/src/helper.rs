//! Constraint-list combinators used by the decider.
//!
//! Flow-node constraints always win over process constraints on a name
//! collision; groups are opaque and never collide by name.

use flowmesh_constraints::hard::PROCESS_EXECUTION_CONSTRAINT_NAMES;
use flowmesh_types::{Constraint, SoftConstraint};

/// Merge process-level and flow-node-level hard constraints.
///
/// The flow-node list is taken as-is; process entries are appended unless a
/// flow-node leaf already claims the same attribute name.
pub fn concat_all_constraints(process: &[Constraint], flow_node: &[Constraint]) -> Vec<Constraint> {
    let mut merged = flow_node.to_vec();
    for constraint in process {
        let collides = constraint
            .name()
            .map(|name| flow_node.iter().any(|fc| fc.name() == Some(name)))
            .unwrap_or(false);
        if !collides {
            merged.push(constraint.clone());
        }
    }
    merged
}

/// Merge soft constraints with flow-node precedence by attribute name.
pub fn concat_soft_constraints(
    process: &[SoftConstraint],
    flow_node: &[SoftConstraint],
) -> Vec<SoftConstraint> {
    let mut merged = flow_node.to_vec();
    for constraint in process {
        if !flow_node.iter().any(|fc| fc.name == constraint.name) {
            merged.push(constraint.clone());
        }
    }
    merged
}

/// Strip the reserved process-execution constraints before any
/// machine-eligibility evaluation; they describe the execution, not machines.
pub fn filter_out_process_execution_constraints(constraints: &[Constraint]) -> Vec<Constraint> {
    constraints
        .iter()
        .filter(|c| {
            c.name()
                .map(|name| !PROCESS_EXECUTION_CONSTRAINT_NAMES.contains(&name))
                .unwrap_or(true)
        })
        .cloned()
        .collect()
}

/// Process constraints minus those shadowed by a flow-node leaf of the same
/// name. Used by the abort pre-check so a flow-node override suppresses the
/// process-level execution constraint.
pub fn filter_out_duplicate_process_constraints(
    process: &[Constraint],
    flow_node: &[Constraint],
) -> Vec<Constraint> {
    process
        .iter()
        .filter(|c| {
            c.name()
                .map(|name| !flow_node.iter().any(|fc| fc.name() == Some(name)))
                .unwrap_or(true)
        })
        .cloned()
        .collect()
}
